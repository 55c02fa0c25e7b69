// Per-interface UVE state: floating IP counters (guarded by a per-entry
// mutex), port bitmap and bandwidth baselines.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bandwidth::BandwidthState;
use crate::models::{FipFlowInfo, InterfaceId, VmFloatingIpStats, VmInterface};
use crate::port_bitmap::L4PortBitmap;

/// Key of a floating IP counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FipKey {
    pub address: Ipv4Addr,
    pub vn: String,
}

impl FipKey {
    pub fn new(address: Ipv4Addr, vn: impl Into<String>) -> Self {
        Self {
            address,
            vn: vn.into(),
        }
    }
}

/// Plain copy of a floating IP's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FipCounters {
    pub in_bytes: u64,
    pub in_packets: u64,
    pub out_bytes: u64,
    pub out_packets: u64,
}

/// Directional byte/packet counters for one floating IP. Shared so a flow
/// record can carry its peer's entry.
#[derive(Debug, Default)]
pub struct FloatingIpEntry {
    in_bytes: AtomicU64,
    in_packets: AtomicU64,
    out_bytes: AtomicU64,
    out_packets: AtomicU64,
}

impl FloatingIpEntry {
    pub fn add_in(&self, bytes: u64, packets: u64) {
        self.in_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.in_packets.fetch_add(packets, Ordering::Relaxed);
    }

    pub fn add_out(&self, bytes: u64, packets: u64) {
        self.out_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.out_packets.fetch_add(packets, Ordering::Relaxed);
    }

    pub fn counters(&self) -> FipCounters {
        FipCounters {
            in_bytes: self.in_bytes.load(Ordering::Relaxed),
            in_packets: self.in_packets.load(Ordering::Relaxed),
            out_bytes: self.out_bytes.load(Ordering::Relaxed),
            out_packets: self.out_packets.load(Ordering::Relaxed),
        }
    }

    /// Attributes one flow delta to this entry.
    ///
    /// Local flows count the reverse half as outbound and the forward half
    /// as inbound, and mirror the delta onto the linked peer entry if the
    /// flow carries one. Other flows follow the ingress flag.
    pub fn update(&self, flow: &FipFlowInfo) {
        if flow.flags.local {
            if flow.flags.reverse {
                self.add_out(flow.bytes, flow.packets);
                if let Some(rev) = &flow.rev_fip {
                    rev.add_out(flow.bytes, flow.packets);
                }
            } else {
                self.add_in(flow.bytes, flow.packets);
                if let Some(rev) = &flow.rev_fip {
                    rev.add_in(flow.bytes, flow.packets);
                }
            }
        } else if flow.flags.ingress {
            self.add_in(flow.bytes, flow.packets);
        } else {
            self.add_out(flow.bytes, flow.packets);
        }
    }
}

type FipTree = BTreeMap<FipKey, Arc<FloatingIpEntry>>;

/// UVE state of one interface of a VM. Config is looked up by `id` on
/// demand, never cached here.
#[derive(Debug)]
pub struct InterfaceEntry {
    id: InterfaceId,
    fip_tree: Mutex<FipTree>,
    pub(crate) port_bitmap: L4PortBitmap,
    pub(crate) bandwidth: BandwidthState,
}

impl InterfaceEntry {
    pub fn new(id: InterfaceId) -> Self {
        Self {
            id,
            fip_tree: Mutex::new(FipTree::new()),
            port_bitmap: L4PortBitmap::default(),
            bandwidth: BandwidthState::default(),
        }
    }

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn port_bitmap(&self) -> &L4PortBitmap {
        &self.port_bitmap
    }

    // Every critical section is a single map operation or counter add, so a
    // poisoned lock still guards a consistent tree.
    fn fips(&self) -> MutexGuard<'_, FipTree> {
        self.fip_tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find_or_create(tree: &mut FipTree, key: FipKey) -> Arc<FloatingIpEntry> {
        tree.entry(key).or_default().clone()
    }

    /// Finds or creates the counter for `(address, vn)`.
    pub fn fip_entry(&self, address: Ipv4Addr, vn: &str) -> Arc<FloatingIpEntry> {
        let mut tree = self.fips();
        Self::find_or_create(&mut tree, FipKey::new(address, vn))
    }

    pub fn update_floating_ip_stats(&self, flow: &FipFlowInfo) {
        let mut tree = self.fips();
        let entry = Self::find_or_create(&mut tree, FipKey::new(flow.fip, flow.source_vn.as_str()));
        entry.update(flow);
    }

    /// One stats record per floating IP configured on `intf`, zeroed when no
    /// traffic has been seen yet. `None` if nothing is configured.
    pub fn snapshot_floating_ip_stats(&self, intf: &VmInterface) -> Option<Vec<VmFloatingIpStats>> {
        let tree = self.fips();
        if !intf.has_floating_ip() {
            return None;
        }
        let iface_name = intf.cfg_name.clone().unwrap_or_default();
        let list = intf
            .floating_ips
            .iter()
            .map(|fip| {
                let key = FipKey::new(fip.address, fip.vn.as_str());
                let c = tree.get(&key).map(|e| e.counters()).unwrap_or_default();
                VmFloatingIpStats {
                    ip_address: fip.address.to_string(),
                    virtual_network: fip.vn.clone(),
                    iface_name: iface_name.clone(),
                    in_bytes: c.in_bytes,
                    in_pkts: c.in_packets,
                    out_bytes: c.out_bytes,
                    out_pkts: c.out_packets,
                }
            })
            .collect();
        Some(list)
    }

    pub fn remove_floating_ip(&self, address: Ipv4Addr, vn: &str) {
        if self.fips().remove(&FipKey::new(address, vn)).is_some() {
            tracing::debug!(
                interface = %self.id,
                %address,
                vn,
                "floating ip counter removed"
            );
        }
    }

    pub fn clear_floating_ips(&self) {
        self.fips().clear();
    }

    /// Counters of `(address, vn)` without creating the entry.
    pub fn fip_counters(&self, address: Ipv4Addr, vn: &str) -> Option<FipCounters> {
        self.fips()
            .get(&FipKey::new(address, vn))
            .map(|e| e.counters())
    }

    pub fn fip_count(&self) -> usize {
        self.fips().len()
    }
}
