// Inputs from the flow/stats path

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;

use super::InterfaceId;
use crate::vm_uve::FloatingIpEntry;

/// Flow classification bits relevant to floating-IP accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowFlags {
    /// Both endpoints terminate on this node.
    pub local: bool,
    /// Reverse half of a flow pair.
    pub reverse: bool,
    pub ingress: bool,
}

/// Stats delta for one flow that was NATed through a floating IP.
#[derive(Debug, Clone)]
pub struct FipFlowInfo {
    pub fip: Ipv4Addr,
    pub source_vn: String,
    /// Interface the floating IP is assigned to.
    pub fip_vm_port_id: InterfaceId,
    pub flags: FlowFlags,
    pub bytes: u64,
    pub packets: u64,
    /// Counter of the peer's floating IP when two local VMs reach each other
    /// through their floating IPs.
    pub rev_fip: Option<Arc<FloatingIpEntry>>,
}

/// Cumulative interface counters as reported by the stats collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    pub in_pkts: u64,
    pub in_bytes: u64,
    pub out_pkts: u64,
    pub out_bytes: u64,
}
