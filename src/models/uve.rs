// Outbound UVE message schemas (VM config UVE and VM stats UVE)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFloatingIpAgent {
    pub ip_address: String,
    pub virtual_network: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInterfaceAgent {
    pub name: String,
    pub vm_name: String,
    pub virtual_network: String,
    pub ip_address: String,
    pub mac_address: String,
    pub floating_ips: Vec<VmFloatingIpAgent>,
    pub label: i32,
    pub active: bool,
    pub l2_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

/// VM UVE. Every optional field is present only when it changed since the
/// last send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UveVirtualMachineAgent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_list: Option<Vec<VmInterfaceAgent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrouter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_sport_bitmap: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_dport_bitmap: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_sport_bitmap: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_dport_bitmap: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInterfaceAgentStats {
    pub name: String,
    pub in_pkts: u64,
    pub in_bytes: u64,
    pub out_pkts: u64,
    pub out_bytes: u64,
    /// Bits per bandwidth interval.
    pub in_bandwidth: u64,
    pub out_bandwidth: u64,
}

/// Bucketed port usage, 8 words of 32 buckets per protocol/direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBucketBitmap {
    pub tcp_sport_bitmap: Vec<u32>,
    pub tcp_dport_bitmap: Vec<u32>,
    pub udp_sport_bitmap: Vec<u32>,
    pub udp_dport_bitmap: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInterfaceAgentBMap {
    pub name: String,
    pub port_bucket_bitmap: PortBucketBitmap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFloatingIpStats {
    pub ip_address: String,
    pub virtual_network: String,
    pub iface_name: String,
    pub in_bytes: u64,
    pub in_pkts: u64,
    pub out_bytes: u64,
    pub out_pkts: u64,
}

/// VM stats UVE; same presence rule as [`UveVirtualMachineAgent`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UveVmStatsAgent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_stats_list: Option<Vec<VmInterfaceAgentStats>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_bmap_list: Option<Vec<VmInterfaceAgentBMap>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_sport_bitmap: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_dport_bitmap: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_sport_bitmap: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_dport_bitmap: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fip_stats_list: Option<Vec<VmFloatingIpStats>>,
}

/// Anything the dispatch loop hands to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UveMessage {
    Vm(UveVirtualMachineAgent),
    VmStats(UveVmStatsAgent),
}

impl UveMessage {
    pub fn vm_name(&self) -> &str {
        match self {
            UveMessage::Vm(m) => &m.name,
            UveMessage::VmStats(m) => &m.name,
        }
    }
}
