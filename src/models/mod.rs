// Domain models: directory config, flow inputs, UVE messages

mod flow;
mod interface;
mod uve;

pub use flow::{FipFlowInfo, FlowFlags, InterfaceCounters};
pub use interface::{FloatingIp, FloatingIpSet, InterfaceId, VmInterface, VnEntry, VnIpam};
pub use uve::{
    PortBucketBitmap, UveMessage, UveVirtualMachineAgent, UveVmStatsAgent, VmFloatingIpAgent,
    VmFloatingIpStats, VmInterfaceAgent, VmInterfaceAgentBMap, VmInterfaceAgentStats,
};
