// Per-VM UVE entry: owns the interface entries, the VM-level port bitmap and
// the last-sent copy of each message used for change detection.

mod interface;

pub use interface::{FipCounters, FipKey, FloatingIpEntry, InterfaceEntry};

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::bandwidth::Direction;
use crate::directory::UveContext;
use crate::error::{Result, UveError};
use crate::models::{
    FipFlowInfo, FloatingIpSet, InterfaceId, UveVirtualMachineAgent, UveVmStatsAgent,
    VmFloatingIpAgent, VmFloatingIpStats, VmInterface, VmInterfaceAgent, VmInterfaceAgentBMap,
    VmInterfaceAgentStats,
};
use crate::port_bitmap::L4PortBitmap;

/// What was last handed to the transport for this VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentVmUve {
    pub interface_list: Vec<VmInterfaceAgent>,
    pub vrouter: Option<String>,
    pub if_stats_list: Vec<VmInterfaceAgentStats>,
    pub if_bmap_list: Vec<VmInterfaceAgentBMap>,
    pub fip_stats_list: Vec<VmFloatingIpStats>,
}

pub struct VmUveEntry {
    name: String,
    ctx: Arc<UveContext>,
    interfaces: BTreeMap<InterfaceId, InterfaceEntry>,
    port_bitmap: L4PortBitmap,
    sent: SentVmUve,
}

impl VmUveEntry {
    pub fn new(name: impl Into<String>, ctx: Arc<UveContext>) -> Self {
        Self {
            name: name.into(),
            ctx,
            interfaces: BTreeMap::new(),
            port_bitmap: L4PortBitmap::default(),
            sent: SentVmUve::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sent(&self) -> &SentVmUve {
        &self.sent
    }

    pub fn port_bitmap(&self) -> &L4PortBitmap {
        &self.port_bitmap
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&InterfaceEntry> {
        self.interfaces.get(&id)
    }

    pub fn interface_ids(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.interfaces.keys().copied()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Tracks `intf` and drops counters of floating IPs that were in
    /// `old_fips` but are no longer configured. New floating IPs get a
    /// counter when their first stats arrive.
    pub fn interface_add(&mut self, intf: &VmInterface, old_fips: &FloatingIpSet) {
        let entry = self.interfaces.entry(intf.id).or_insert_with(|| {
            debug!(vm = %self.name, interface = %intf.id, "interface added");
            InterfaceEntry::new(intf.id)
        });
        for fip in old_fips.difference(&intf.floating_ips) {
            entry.remove_floating_ip(fip.address, &fip.vn);
        }
    }

    pub fn interface_delete(&mut self, id: InterfaceId) {
        if let Some(entry) = self.interfaces.remove(&id) {
            entry.clear_floating_ips();
            debug!(vm = %self.name, interface = %id, "interface deleted");
        }
    }

    /// Marks the port pair on the VM bitmap and on every interface bitmap.
    pub fn update_port_bitmap(&mut self, proto: u8, sport: u16, dport: u16) {
        self.port_bitmap.add_port(proto, sport, dport);
        for entry in self.interfaces.values_mut() {
            entry.port_bitmap.add_port(proto, sport, dport);
        }
    }

    pub fn fip_entry(
        &self,
        address: Ipv4Addr,
        vn: &str,
        id: InterfaceId,
    ) -> Result<Arc<FloatingIpEntry>> {
        Ok(self.tracked(id)?.fip_entry(address, vn))
    }

    pub fn update_floating_ip_stats(&self, flow: &FipFlowInfo) -> Result<()> {
        self.tracked(flow.fip_vm_port_id)?
            .update_floating_ip_stats(flow);
        Ok(())
    }

    fn tracked(&self, id: InterfaceId) -> Result<&InterfaceEntry> {
        self.interfaces
            .get(&id)
            .ok_or_else(|| UveError::InterfaceNotTracked {
                vm: self.name.clone(),
                interface: id,
            })
    }

    /// Gateway of the first IPAM entry of the interface's VN whose subnet
    /// holds the interface address.
    pub fn resolve_gateway(&self, intf: &VmInterface) -> Option<String> {
        let vn = self.ctx.vns.find_vn(intf.vn.as_deref()?)?;
        vn.ipam
            .iter()
            .find(|ipam| ipam.is_subnet_member(intf.ip_addr))
            .map(|ipam| ipam.default_gw.to_string())
    }

    /// `None` while the interface has no config name.
    pub fn build_interface_snapshot(&self, intf: &VmInterface) -> Option<VmInterfaceAgent> {
        let name = intf.cfg_name.clone()?;
        let floating_ips = intf
            .floating_ips
            .iter()
            .map(|fip| VmFloatingIpAgent {
                ip_address: fip.address.to_string(),
                virtual_network: fip.vn.clone(),
            })
            .collect();
        Some(VmInterfaceAgent {
            name,
            vm_name: intf.vm_name.clone(),
            virtual_network: intf.vn.clone().unwrap_or_default(),
            ip_address: intf.ip_addr.to_string(),
            mac_address: intf.vm_mac.clone(),
            floating_ips,
            label: intf.label,
            active: intf.ipv4_active,
            l2_active: intf.l2_active,
            gateway: self.resolve_gateway(intf),
        })
    }

    fn lookup(&self, id: InterfaceId) -> Option<Arc<VmInterface>> {
        let intf = self.ctx.interfaces.find_interface(id);
        if intf.is_none() {
            debug!(vm = %self.name, interface = %id, "interface missing from directory");
        }
        intf
    }

    /// Builds the VM UVE. Returns `None` when nothing changed since the last
    /// message; otherwise the changed fields are recorded as sent.
    #[instrument(skip(self), fields(vm = %self.name, operation = "build_vm_message"))]
    pub fn build_vm_message(&mut self) -> Option<UveVirtualMachineAgent> {
        let mut uve = UveVirtualMachineAgent {
            name: self.name.clone(),
            ..Default::default()
        };
        let mut changed = false;

        let interface_list: Vec<VmInterfaceAgent> = self
            .interfaces
            .keys()
            .filter_map(|id| self.lookup(*id))
            .filter_map(|intf| self.build_interface_snapshot(&intf))
            .collect();
        if interface_list != self.sent.interface_list {
            self.sent.interface_list = interface_list.clone();
            uve.interface_list = Some(interface_list);
            changed = true;
        }

        let hostname = &self.ctx.hostname;
        if self.sent.vrouter.as_ref() != Some(hostname) {
            self.sent.vrouter = Some(hostname.clone());
            uve.vrouter = Some(hostname.clone());
            changed = true;
        }

        let ports = self.port_bitmap.sync();
        if !ports.is_empty() {
            changed = true;
        }
        uve.tcp_sport_bitmap = ports.tcp_sport;
        uve.tcp_dport_bitmap = ports.tcp_dport;
        uve.udp_sport_bitmap = ports.udp_sport;
        uve.udp_dport_bitmap = ports.udp_dport;

        changed.then_some(uve)
    }

    /// Builds the VM stats UVE under the same rules as
    /// [`build_vm_message`](Self::build_vm_message).
    #[instrument(skip(self), fields(vm = %self.name, operation = "build_vm_stats_message"))]
    pub fn build_vm_stats_message(&mut self) -> Option<UveVmStatsAgent> {
        let mut uve = UveVmStatsAgent {
            name: self.name.clone(),
            ..Default::default()
        };
        let mut changed = false;

        let ctx = self.ctx.clone();
        let interval = ctx.bandwidth_interval_usecs;
        let mut if_stats_list = Vec::new();
        let mut if_bmap_list = Vec::new();
        let mut fip_stats_list = Vec::new();

        for (id, entry) in self.interfaces.iter_mut() {
            let Some(intf) = ctx.interfaces.find_interface(*id) else {
                debug!(vm = %self.name, interface = %id, "interface missing from directory");
                continue;
            };
            let name = intf.cfg_name.clone().unwrap_or_default();

            if intf.cfg_name.is_some()
                && let Some(counters) = ctx.stats.interface_stats(*id)
            {
                let now = ctx.clock.now_usec();
                let in_bandwidth = entry
                    .bandwidth
                    .estimate(&counters, Direction::In, now, interval);
                let out_bandwidth = entry
                    .bandwidth
                    .estimate(&counters, Direction::Out, now, interval);
                if_stats_list.push(VmInterfaceAgentStats {
                    name: name.clone(),
                    in_pkts: counters.in_pkts,
                    in_bytes: counters.in_bytes,
                    out_pkts: counters.out_pkts,
                    out_bytes: counters.out_bytes,
                    in_bandwidth,
                    out_bandwidth,
                });
            }

            if_bmap_list.push(VmInterfaceAgentBMap {
                name,
                port_bucket_bitmap: entry.port_bitmap.encode(),
            });

            if let Some(fips) = entry.snapshot_floating_ip_stats(&intf) {
                fip_stats_list.extend(fips);
            }
        }

        if if_stats_list != self.sent.if_stats_list {
            self.sent.if_stats_list = if_stats_list.clone();
            uve.if_stats_list = Some(if_stats_list);
            changed = true;
        }

        if if_bmap_list != self.sent.if_bmap_list {
            self.sent.if_bmap_list = if_bmap_list.clone();
            uve.if_bmap_list = Some(if_bmap_list);
            changed = true;
        }

        let ports = self.port_bitmap.sync();
        if !ports.is_empty() {
            changed = true;
        }
        uve.tcp_sport_bitmap = ports.tcp_sport;
        uve.tcp_dport_bitmap = ports.tcp_dport;
        uve.udp_sport_bitmap = ports.udp_sport;
        uve.udp_dport_bitmap = ports.udp_dport;

        if fip_stats_list != self.sent.fip_stats_list {
            self.sent.fip_stats_list = fip_stats_list.clone();
            uve.fip_stats_list = Some(fip_stats_list);
            changed = true;
        }

        changed.then_some(uve)
    }
}
