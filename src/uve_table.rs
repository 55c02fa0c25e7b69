// Table of per-VM UVE entries shared by the config path, the flow path and
// the dispatch loop.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::directory::UveContext;
use crate::error::{Result, UveError};
use crate::models::{
    FipFlowInfo, FloatingIpSet, InterfaceId, UveMessage, UveVirtualMachineAgent, VmInterface,
};
use crate::vm_uve::{FloatingIpEntry, SentVmUve, VmUveEntry};

/// Config, port and build operations take the write lock; flow stats take the
/// read lock so flow threads only contend on the per-interface mutex.
pub struct VmUveTable {
    ctx: Arc<UveContext>,
    vms: RwLock<BTreeMap<String, VmUveEntry>>,
}

impl VmUveTable {
    pub fn new(ctx: UveContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            vms: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn context(&self) -> &UveContext {
        &self.ctx
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, VmUveEntry>> {
        self.vms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, VmUveEntry>> {
        self.vms.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn vm_add(&self, vm: &str) {
        let mut vms = self.write();
        if !vms.contains_key(vm) {
            vms.insert(vm.to_string(), VmUveEntry::new(vm, self.ctx.clone()));
            info!(vm, "vm uve entry created");
        }
    }

    /// Drops the VM entry and returns the delete marker to send, if the VM
    /// was tracked.
    pub fn vm_delete(&self, vm: &str) -> Option<UveVirtualMachineAgent> {
        self.write().remove(vm)?;
        info!(vm, "vm uve entry deleted");
        Some(UveVirtualMachineAgent {
            name: vm.to_string(),
            deleted: Some(true),
            ..Default::default()
        })
    }

    pub fn interface_add(&self, vm: &str, intf: &VmInterface, old_fips: &FloatingIpSet) {
        let mut vms = self.write();
        let entry = vms
            .entry(vm.to_string())
            .or_insert_with(|| VmUveEntry::new(vm, self.ctx.clone()));
        entry.interface_add(intf, old_fips);
    }

    pub fn interface_delete(&self, vm: &str, id: InterfaceId) {
        if let Some(entry) = self.write().get_mut(vm) {
            entry.interface_delete(id);
        }
    }

    pub fn update_port_bitmap(&self, vm: &str, proto: u8, sport: u16, dport: u16) -> Result<()> {
        let mut vms = self.write();
        let entry = vms.get_mut(vm).ok_or_else(|| not_found(vm))?;
        entry.update_port_bitmap(proto, sport, dport);
        Ok(())
    }

    pub fn fip_entry(
        &self,
        vm: &str,
        address: Ipv4Addr,
        vn: &str,
        id: InterfaceId,
    ) -> Result<Arc<FloatingIpEntry>> {
        let vms = self.read();
        let entry = vms.get(vm).ok_or_else(|| not_found(vm))?;
        entry.fip_entry(address, vn, id).inspect_err(|e| {
            warn!(error = %e, operation = "fip_entry", "missed interface notification");
        })
    }

    pub fn update_floating_ip_stats(&self, vm: &str, flow: &FipFlowInfo) -> Result<()> {
        let vms = self.read();
        let entry = vms.get(vm).ok_or_else(|| not_found(vm))?;
        entry.update_floating_ip_stats(flow).inspect_err(|e| {
            warn!(
                error = %e,
                operation = "update_floating_ip_stats",
                "missed interface notification"
            );
        })
    }

    /// Runs both builds for every VM and returns the messages that changed.
    pub fn collect_changed(&self) -> Vec<UveMessage> {
        let mut vms = self.write();
        let mut out = Vec::new();
        for entry in vms.values_mut() {
            if let Some(uve) = entry.build_vm_message() {
                out.push(UveMessage::Vm(uve));
            }
            if let Some(uve) = entry.build_vm_stats_message() {
                out.push(UveMessage::VmStats(uve));
            }
        }
        debug!(vm_count = vms.len(), changed = out.len(), "uve pass complete");
        out
    }

    pub fn sent_snapshot(&self, vm: &str) -> Option<SentVmUve> {
        self.read().get(vm).map(|e| e.sent().clone())
    }

    pub fn vm_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn vm_count(&self) -> usize {
        self.read().len()
    }

    /// Runs `f` against one VM entry, for callers that need more than the
    /// table exposes.
    ///
    /// `f` runs under the table read lock. Calling a table method that takes
    /// the write lock (`vm_add`, `interface_add`, `collect_changed`, ...)
    /// from inside `f` deadlocks.
    pub fn with_vm<R>(&self, vm: &str, f: impl FnOnce(&VmUveEntry) -> R) -> Option<R> {
        self.read().get(vm).map(f)
    }
}

fn not_found(vm: &str) -> UveError {
    warn!(vm, "no uve entry for vm");
    UveError::VmNotFound { vm: vm.to_string() }
}
