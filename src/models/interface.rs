// Interface and virtual-network config as read from the agent's directories

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// Interface identity as used by the interface table (port id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfaceId(pub u32);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured floating IP: address plus the virtual network it belongs to.
/// Ordering is by address, then network name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FloatingIp {
    pub address: Ipv4Addr,
    pub vn: String,
}

impl FloatingIp {
    pub fn new(address: Ipv4Addr, vn: impl Into<String>) -> Self {
        Self {
            address,
            vn: vn.into(),
        }
    }
}

pub type FloatingIpSet = BTreeSet<FloatingIp>;

/// Momentary view of a VM interface's config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInterface {
    pub id: InterfaceId,
    /// Config name; `None` until the interface is configured.
    pub cfg_name: Option<String>,
    pub vm_name: String,
    /// Owning virtual network, if known.
    pub vn: Option<String>,
    pub ip_addr: Ipv4Addr,
    pub vm_mac: String,
    pub label: i32,
    pub ipv4_active: bool,
    pub l2_active: bool,
    pub floating_ips: FloatingIpSet,
}

impl VmInterface {
    pub fn has_floating_ip(&self) -> bool {
        !self.floating_ips.is_empty()
    }
}

/// One IPAM subnet of a virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnIpam {
    pub prefix: Ipv4Addr,
    pub plen: u8,
    pub default_gw: Ipv4Addr,
}

impl VnIpam {
    pub fn new(prefix: Ipv4Addr, plen: u8, default_gw: Ipv4Addr) -> Self {
        Self {
            prefix,
            plen,
            default_gw,
        }
    }

    fn mask(&self) -> u32 {
        match self.plen {
            0 => 0,
            p if p >= 32 => u32::MAX,
            p => u32::MAX << (32 - p),
        }
    }

    pub fn is_subnet_member(&self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        (u32::from(addr) & mask) == (u32::from(self.prefix) & mask)
    }
}

/// Virtual network config: name plus IPAM entries in configured order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnEntry {
    pub name: String,
    pub ipam: Vec<VnIpam>,
}
