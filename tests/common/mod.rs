// Shared test helpers

#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::Arc;
use vm_uve::directory::{InMemoryDirectory, InMemoryStats, ManualClock, UveContext};
use vm_uve::models::*;

pub const SEC: u64 = 1_000_000;
pub const HOSTNAME: &str = "compute-1";

pub struct Fixture {
    pub dir: Arc<InMemoryDirectory>,
    pub stats: Arc<InMemoryStats>,
    pub clock: Arc<ManualClock>,
    pub ctx: Arc<UveContext>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = Arc::new(InMemoryDirectory::new());
        let stats = Arc::new(InMemoryStats::new());
        let clock = Arc::new(ManualClock::new(100 * SEC));
        let ctx = Arc::new(UveContext {
            interfaces: dir.clone(),
            vns: dir.clone(),
            stats: stats.clone(),
            clock: clock.clone(),
            hostname: HOSTNAME.to_string(),
            bandwidth_interval_usecs: SEC,
        });
        Self {
            dir,
            stats,
            clock,
            ctx,
        }
    }

    pub fn context(&self) -> UveContext {
        self.ctx.as_ref().clone()
    }
}

pub fn fip(a: [u8; 4], vn: &str) -> FloatingIp {
    FloatingIp::new(Ipv4Addr::from(a), vn)
}

pub fn fips(list: &[FloatingIp]) -> FloatingIpSet {
    list.iter().cloned().collect()
}

/// Configured interface `tap<id>` of vm1 on vnA with address 10.1.1.<id>.
pub fn interface(id: u32) -> VmInterface {
    VmInterface {
        id: InterfaceId(id),
        cfg_name: Some(format!("tap{id}")),
        vm_name: "vm1".into(),
        vn: Some("vnA".into()),
        ip_addr: Ipv4Addr::new(10, 1, 1, id as u8),
        vm_mac: format!("02:00:00:00:00:{id:02x}"),
        label: 16 + id as i32,
        ipv4_active: true,
        l2_active: true,
        floating_ips: FloatingIpSet::new(),
    }
}

pub fn flow(id: u32, address: [u8; 4], vn: &str, flags: FlowFlags, bytes: u64, packets: u64) -> FipFlowInfo {
    FipFlowInfo {
        fip: Ipv4Addr::from(address),
        source_vn: vn.into(),
        fip_vm_port_id: InterfaceId(id),
        flags,
        bytes,
        packets,
        rev_fip: None,
    }
}

pub fn ingress() -> FlowFlags {
    FlowFlags {
        ingress: true,
        ..Default::default()
    }
}

pub fn egress() -> FlowFlags {
    FlowFlags::default()
}

pub fn local(reverse: bool) -> FlowFlags {
    FlowFlags {
        local: true,
        reverse,
        ingress: false,
    }
}
