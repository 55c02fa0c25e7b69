// VmUveEntry tests: interface set, change detection, snapshots, gateway

mod common;

use common::*;
use std::net::Ipv4Addr;
use vm_uve::models::*;
use vm_uve::port_bitmap::{IPPROTO_TCP, IPPROTO_UDP, WORD_COUNT};
use vm_uve::vm_uve::VmUveEntry;

fn words(set: &[(usize, u32)]) -> Vec<u32> {
    let mut w = vec![0u32; WORD_COUNT];
    for (i, v) in set {
        w[*i] = *v;
    }
    w
}

fn entry_with(fx: &Fixture, intfs: &[VmInterface]) -> VmUveEntry {
    let mut entry = VmUveEntry::new("vm1", fx.ctx.clone());
    for intf in intfs {
        fx.dir.upsert_interface(intf.clone());
        entry.interface_add(intf, &FloatingIpSet::new());
    }
    entry
}

#[test]
fn vm_message_lifecycle_reports_only_changes() {
    let fx = Fixture::new();
    let a = interface(1);
    let mut entry = entry_with(&fx, std::slice::from_ref(&a));

    let uve = entry.build_vm_message().expect("first build changed");
    assert_eq!(uve.name, "vm1");
    assert_eq!(uve.vrouter.as_deref(), Some(HOSTNAME));
    let list = uve.interface_list.expect("interface list staged");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "tap1");
    assert!(uve.tcp_sport_bitmap.is_none());

    assert!(entry.build_vm_message().is_none());

    entry.update_port_bitmap(IPPROTO_TCP, 80, 12345);
    let uve = entry.build_vm_message().expect("port update changed");
    assert!(uve.interface_list.is_none());
    assert!(uve.vrouter.is_none());
    assert_eq!(uve.tcp_sport_bitmap, Some(words(&[(0, 1)])));
    assert_eq!(uve.tcp_dport_bitmap, Some(words(&[(1, 1 << 16)])));
    assert!(uve.udp_sport_bitmap.is_none());

    entry.interface_delete(a.id);
    let uve = entry.build_vm_message().expect("delete changed");
    assert_eq!(uve.interface_list, Some(vec![]));
    assert!(entry.build_vm_message().is_none());
}

#[test]
fn interface_snapshot_carries_config() {
    let fx = Fixture::new();
    let mut a = interface(3);
    a.floating_ips = fips(&[fip([172, 16, 0, 9], "public"), fip([172, 16, 0, 2], "public")]);
    let mut entry = entry_with(&fx, &[a]);

    let uve = entry.build_vm_message().unwrap();
    let s = &uve.interface_list.unwrap()[0];
    assert_eq!(s.vm_name, "vm1");
    assert_eq!(s.virtual_network, "vnA");
    assert_eq!(s.ip_address, "10.1.1.3");
    assert_eq!(s.mac_address, "02:00:00:00:00:03");
    assert_eq!(s.label, 19);
    assert!(s.active);
    assert!(s.l2_active);
    assert_eq!(
        s.floating_ips,
        vec![
            VmFloatingIpAgent {
                ip_address: "172.16.0.2".into(),
                virtual_network: "public".into(),
            },
            VmFloatingIpAgent {
                ip_address: "172.16.0.9".into(),
                virtual_network: "public".into(),
            },
        ]
    );
    // vnA is not in the VN directory
    assert_eq!(s.gateway, None);
}

#[test]
fn unnamed_interface_is_left_out() {
    let fx = Fixture::new();
    let mut a = interface(1);
    a.cfg_name = None;
    let mut entry = entry_with(&fx, &[a.clone()]);

    assert!(entry.build_interface_snapshot(&a).is_none());
    let uve = entry.build_vm_message().expect("vrouter is new");
    assert!(uve.interface_list.is_none());

    a.cfg_name = Some("tap1".into());
    fx.dir.upsert_interface(a);
    let uve = entry.build_vm_message().expect("interface now named");
    assert_eq!(uve.interface_list.unwrap()[0].name, "tap1");
}

#[test]
fn config_change_is_read_live() {
    let fx = Fixture::new();
    let mut a = interface(1);
    let mut entry = entry_with(&fx, &[a.clone()]);
    entry.build_vm_message();

    a.ipv4_active = false;
    fx.dir.upsert_interface(a);
    let uve = entry.build_vm_message().expect("active flag changed");
    assert!(!uve.interface_list.unwrap()[0].active);
}

#[test]
fn gateway_uses_first_matching_ipam_entry() {
    let fx = Fixture::new();
    fx.dir.upsert_vn(VnEntry {
        name: "vnA".into(),
        ipam: vec![
            VnIpam::new(Ipv4Addr::new(10, 2, 0, 0), 16, Ipv4Addr::new(10, 2, 0, 1)),
            VnIpam::new(Ipv4Addr::new(10, 1, 0, 0), 16, Ipv4Addr::new(10, 1, 0, 1)),
            VnIpam::new(Ipv4Addr::new(10, 1, 1, 0), 24, Ipv4Addr::new(10, 1, 1, 254)),
        ],
    });
    let a = interface(1);
    let entry = entry_with(&fx, &[a.clone()]);
    assert_eq!(entry.resolve_gateway(&a).as_deref(), Some("10.1.0.1"));

    let mut outside = a.clone();
    outside.ip_addr = Ipv4Addr::new(192, 168, 0, 1);
    assert_eq!(entry.resolve_gateway(&outside), None);

    let mut no_vn = a;
    no_vn.vn = None;
    assert_eq!(entry.resolve_gateway(&no_vn), None);
    assert_eq!(entry.build_interface_snapshot(&no_vn).unwrap().virtual_network, "");
}

#[test]
fn interface_set_has_one_entry_per_interface() {
    let fx = Fixture::new();
    let mut entry = VmUveEntry::new("vm1", fx.ctx.clone());
    let none = FloatingIpSet::new();
    entry.interface_add(&interface(1), &none);
    entry.interface_add(&interface(2), &none);
    entry.interface_add(&interface(1), &none);
    assert_eq!(entry.interface_count(), 2);

    entry.interface_delete(InterfaceId(1));
    entry.interface_delete(InterfaceId(1));
    entry.interface_delete(InterfaceId(9));
    assert_eq!(entry.interface_ids().collect::<Vec<_>>(), vec![InterfaceId(2)]);
}

#[test]
fn interface_add_removes_only_unassigned_floating_ips() {
    let fx = Fixture::new();
    let x = fip([1, 1, 1, 1], "vnX");
    let y = fip([1, 1, 1, 2], "vnX");
    let z = fip([1, 1, 1, 3], "vnX");
    let w = fip([1, 1, 1, 4], "vnX");

    let mut a = interface(1);
    a.floating_ips = fips(&[x.clone(), y.clone()]);
    let mut entry = entry_with(&fx, &[a.clone()]);
    for f in [&x, &y, &z] {
        entry.fip_entry(f.address, &f.vn, a.id).unwrap();
    }

    let old = a.floating_ips.clone();
    a.floating_ips = fips(&[y.clone(), w.clone()]);
    entry.interface_add(&a, &old);

    let ie = entry.interface(a.id).unwrap();
    assert!(ie.fip_counters(x.address, &x.vn).is_none());
    assert!(ie.fip_counters(y.address, &y.vn).is_some());
    assert!(ie.fip_counters(z.address, &z.vn).is_some());
    assert!(ie.fip_counters(w.address, &w.vn).is_none());
    assert_eq!(ie.fip_count(), 2);
}

#[test]
fn interface_delete_drops_floating_ip_counters() {
    let fx = Fixture::new();
    let a = interface(1);
    let mut entry = entry_with(&fx, &[a.clone()]);
    entry
        .update_floating_ip_stats(&flow(1, [10, 1, 1, 5], "vnA", ingress(), 10, 1))
        .unwrap();
    entry.interface_delete(a.id);

    entry.interface_add(&a, &FloatingIpSet::new());
    assert_eq!(entry.interface(a.id).unwrap().fip_count(), 0);
}

#[test]
fn port_bitmap_fans_out_to_current_interfaces() {
    let fx = Fixture::new();
    let mut entry = entry_with(&fx, &[interface(1), interface(2)]);
    entry.update_port_bitmap(IPPROTO_UDP, 53, 33000);
    entry.interface_add(&interface(3), &FloatingIpSet::new());

    for id in [1, 2] {
        let ie = entry.interface(InterfaceId(id)).unwrap();
        assert_eq!(ie.port_bitmap().udp_sport.hits(53), 1);
        assert_eq!(ie.port_bitmap().udp_dport.hits(33000), 1);
    }
    let late = entry.interface(InterfaceId(3)).unwrap();
    assert_eq!(late.port_bitmap().udp_sport.hits(53), 0);
    assert_eq!(entry.port_bitmap().udp_sport.hits(53), 1);
}

#[test]
fn vm_port_bitmap_change_is_reported_once_across_builds() {
    let fx = Fixture::new();
    let mut entry = entry_with(&fx, &[interface(1)]);
    entry.build_vm_message();
    entry.build_vm_stats_message();

    entry.update_port_bitmap(IPPROTO_TCP, 443, 50000);
    let uve = entry.build_vm_message().unwrap();
    assert!(uve.tcp_dport_bitmap.is_some());

    let stats = entry.build_vm_stats_message().expect("interface bitmap changed");
    assert!(stats.tcp_sport_bitmap.is_none());
    assert!(stats.tcp_dport_bitmap.is_none());
    let bmaps = stats.if_bmap_list.unwrap();
    assert_eq!(bmaps[0].port_bucket_bitmap.tcp_sport_bitmap[0], 1 << 1);
}

#[test]
fn stats_message_estimates_bandwidth() {
    let fx = Fixture::new();
    let a = interface(1);
    let mut entry = entry_with(&fx, &[a.clone()]);
    fx.stats.set(
        a.id,
        InterfaceCounters {
            in_pkts: 10,
            in_bytes: 1_000,
            out_pkts: 20,
            out_bytes: 2_000,
        },
    );

    let uve = entry.build_vm_stats_message().expect("first build changed");
    let stats = uve.if_stats_list.unwrap();
    assert_eq!(
        stats,
        vec![VmInterfaceAgentStats {
            name: "tap1".into(),
            in_pkts: 10,
            in_bytes: 1_000,
            out_pkts: 20,
            out_bytes: 2_000,
            in_bandwidth: 0,
            out_bandwidth: 0,
        }]
    );
    assert_eq!(uve.if_bmap_list.unwrap()[0].name, "tap1");
    assert!(uve.fip_stats_list.is_none());

    fx.clock.advance(2 * SEC);
    assert!(entry.build_vm_stats_message().is_none());

    fx.stats.set(
        a.id,
        InterfaceCounters {
            in_pkts: 12,
            in_bytes: 3_000,
            out_pkts: 20,
            out_bytes: 2_000,
        },
    );
    fx.clock.advance(2 * SEC);
    let uve = entry.build_vm_stats_message().unwrap();
    let s = &uve.if_stats_list.unwrap()[0];
    assert_eq!(s.in_bandwidth, 8_000);
    assert_eq!(s.out_bandwidth, 0);
    assert!(uve.if_bmap_list.is_none());
}

#[test]
fn stats_message_without_collector_sample_skips_interface_stats() {
    let fx = Fixture::new();
    let mut entry = entry_with(&fx, &[interface(1)]);
    let uve = entry.build_vm_stats_message().expect("bitmap list is new");
    assert!(uve.if_stats_list.is_none());
    assert_eq!(uve.if_bmap_list.unwrap().len(), 1);
    assert_eq!(entry.sent().if_stats_list, vec![]);
}

#[test]
fn stats_message_reports_configured_floating_ips() {
    let fx = Fixture::new();
    let mut a = interface(1);
    a.floating_ips = fips(&[fip([10, 1, 1, 5], "vnA"), fip([10, 9, 9, 9], "vnB")]);
    let mut entry = entry_with(&fx, &[a]);
    entry
        .update_floating_ip_stats(&flow(1, [10, 1, 1, 5], "vnA", ingress(), 1_000, 2))
        .unwrap();

    let uve = entry.build_vm_stats_message().unwrap();
    let list = uve.fip_stats_list.unwrap();
    assert_eq!(
        list,
        vec![
            VmFloatingIpStats {
                ip_address: "10.1.1.5".into(),
                virtual_network: "vnA".into(),
                iface_name: "tap1".into(),
                in_bytes: 1_000,
                in_pkts: 2,
                out_bytes: 0,
                out_pkts: 0,
            },
            VmFloatingIpStats {
                ip_address: "10.9.9.9".into(),
                virtual_network: "vnB".into(),
                iface_name: "tap1".into(),
                ..Default::default()
            },
        ]
    );

    assert!(entry.build_vm_stats_message().is_none());
    entry
        .update_floating_ip_stats(&flow(1, [10, 9, 9, 9], "vnB", egress(), 64, 1))
        .unwrap();
    let uve = entry.build_vm_stats_message().unwrap();
    assert_eq!(uve.fip_stats_list.unwrap()[1].out_bytes, 64);
}

#[test]
fn interface_missing_from_directory_is_skipped() {
    let fx = Fixture::new();
    let mut entry = VmUveEntry::new("vm1", fx.ctx.clone());
    entry.interface_add(&interface(7), &FloatingIpSet::new());

    let uve = entry.build_vm_message().unwrap();
    assert!(uve.interface_list.is_none());
    assert!(entry.build_vm_stats_message().is_none());
}

#[test]
fn stats_for_untracked_interface_is_an_error() {
    let fx = Fixture::new();
    let entry = entry_with(&fx, &[interface(1)]);
    let err = entry
        .update_floating_ip_stats(&flow(2, [10, 1, 1, 5], "vnA", ingress(), 1, 1))
        .unwrap_err();
    assert_eq!(
        err,
        vm_uve::error::UveError::InterfaceNotTracked {
            vm: "vm1".into(),
            interface: InterfaceId(2),
        }
    );
    assert!(entry.fip_entry(Ipv4Addr::new(10, 1, 1, 5), "vnA", InterfaceId(2)).is_err());
}

#[test]
fn removed_vn_drops_gateway() {
    let fx = Fixture::new();
    fx.dir.upsert_vn(VnEntry {
        name: "vnA".into(),
        ipam: vec![VnIpam::new(
            Ipv4Addr::new(10, 1, 1, 0),
            24,
            Ipv4Addr::new(10, 1, 1, 254),
        )],
    });
    let mut entry = entry_with(&fx, &[interface(1)]);
    let uve = entry.build_vm_message().unwrap();
    assert_eq!(
        uve.interface_list.unwrap()[0].gateway.as_deref(),
        Some("10.1.1.254")
    );

    fx.dir.remove_vn("vnA");
    let uve = entry.build_vm_message().expect("gateway change reported");
    assert_eq!(uve.interface_list.unwrap()[0].gateway, None);
    assert!(entry.build_vm_message().is_none());
}

#[test]
fn interface_removed_from_directory_leaves_message() {
    let fx = Fixture::new();
    let a = interface(1);
    let mut entry = entry_with(&fx, &[a.clone(), interface(2)]);
    entry.build_vm_message().unwrap();

    assert!(fx.dir.remove_interface(a.id).is_some());
    let uve = entry.build_vm_message().expect("list shrank");
    let names: Vec<_> = uve.interface_list.unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["tap2".to_string()]);
    assert_eq!(entry.interface_count(), 2);
}

#[test]
fn stats_becoming_unavailable_is_reported() {
    let fx = Fixture::new();
    let a = interface(1);
    let mut entry = entry_with(&fx, &[a.clone()]);
    fx.stats.set(
        a.id,
        InterfaceCounters {
            in_pkts: 1,
            in_bytes: 100,
            out_pkts: 1,
            out_bytes: 100,
        },
    );
    let uve = entry.build_vm_stats_message().unwrap();
    assert_eq!(uve.if_stats_list.unwrap().len(), 1);

    fx.stats.remove(a.id);
    let uve = entry.build_vm_stats_message().expect("stats entry dropped");
    assert_eq!(uve.if_stats_list, Some(vec![]));
    assert!(uve.if_bmap_list.is_none());
    assert!(entry.build_vm_stats_message().is_none());
}

#[test]
fn clock_step_back_reports_zero_bandwidth() {
    let fx = Fixture::new();
    let a = interface(1);
    let mut entry = entry_with(&fx, &[a.clone()]);
    let counters = |in_bytes| InterfaceCounters {
        in_pkts: 1,
        in_bytes,
        out_pkts: 0,
        out_bytes: 0,
    };
    fx.stats.set(a.id, counters(1_000));
    entry.build_vm_stats_message().unwrap();

    fx.clock.set(50 * SEC);
    fx.stats.set(a.id, counters(5_000));
    let uve = entry.build_vm_stats_message().unwrap();
    assert_eq!(uve.if_stats_list.unwrap()[0].in_bandwidth, 0);

    // the stepped-back sample is the new baseline
    fx.clock.advance(SEC);
    fx.stats.set(a.id, counters(6_000));
    let uve = entry.build_vm_stats_message().unwrap();
    assert_eq!(uve.if_stats_list.unwrap()[0].in_bandwidth, 8_000);
}
