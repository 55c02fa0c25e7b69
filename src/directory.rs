// Collaborators the UVE entries read from: interface/VN directories, the
// stats collector and a clock. Handles are passed in at construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{InterfaceCounters, InterfaceId, VmInterface, VnEntry};

pub trait InterfaceDirectory: Send + Sync {
    fn find_interface(&self, id: InterfaceId) -> Option<Arc<VmInterface>>;
}

pub trait VnDirectory: Send + Sync {
    fn find_vn(&self, name: &str) -> Option<Arc<VnEntry>>;
}

pub trait StatsCollector: Send + Sync {
    /// Cumulative counters, or `None` if the collector has no sample yet.
    fn interface_stats(&self, id: InterfaceId) -> Option<InterfaceCounters>;
}

pub trait Clock: Send + Sync {
    /// Microsecond timestamp. Should not step backwards; bandwidth samples
    /// taken across a backwards step report 0.
    fn now_usec(&self) -> u64;
}

/// Everything a `VmUveEntry` needs from the rest of the agent.
#[derive(Clone)]
pub struct UveContext {
    pub interfaces: Arc<dyn InterfaceDirectory>,
    pub vns: Arc<dyn VnDirectory>,
    pub stats: Arc<dyn StatsCollector>,
    pub clock: Arc<dyn Clock>,
    pub hostname: String,
    pub bandwidth_interval_usecs: u64,
}

/// Wall clock in UTC microseconds. Not monotonic: an NTP step back makes
/// the next bandwidth sample report 0 instead of a rate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_usec(&self) -> u64 {
        chrono::Utc::now().timestamp_micros().max(0) as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_usec: u64) -> Self {
        Self {
            now: AtomicU64::new(start_usec),
        }
    }

    pub fn advance(&self, usec: u64) {
        self.now.fetch_add(usec, Ordering::Relaxed);
    }

    pub fn set(&self, usec: u64) {
        self.now.store(usec, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_usec(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// In-memory interface and VN tables, fed by config notifications.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    interfaces: RwLock<HashMap<InterfaceId, Arc<VmInterface>>>,
    vns: RwLock<HashMap<String, Arc<VnEntry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `intf` and returns the config it replaced.
    pub fn upsert_interface(&self, intf: VmInterface) -> Option<Arc<VmInterface>> {
        self.interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(intf.id, Arc::new(intf))
    }

    pub fn remove_interface(&self, id: InterfaceId) -> Option<Arc<VmInterface>> {
        self.interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn upsert_vn(&self, vn: VnEntry) {
        self.vns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(vn.name.clone(), Arc::new(vn));
    }

    pub fn remove_vn(&self, name: &str) {
        self.vns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl InterfaceDirectory for InMemoryDirectory {
    fn find_interface(&self, id: InterfaceId) -> Option<Arc<VmInterface>> {
        self.interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

impl VnDirectory for InMemoryDirectory {
    fn find_vn(&self, name: &str) -> Option<Arc<VnEntry>> {
        self.vns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// In-memory stats table, written by whatever polls the datapath.
#[derive(Debug, Default)]
pub struct InMemoryStats {
    counters: RwLock<HashMap<InterfaceId, InterfaceCounters>>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: InterfaceId, counters: InterfaceCounters) {
        self.counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, counters);
    }

    pub fn remove(&self, id: InterfaceId) {
        self.counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

impl StatsCollector for InMemoryStats {
    fn interface_stats(&self, id: InterfaceId) -> Option<InterfaceCounters> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }
}
