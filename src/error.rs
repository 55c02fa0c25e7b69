// Library error type. Missing optional data is modelled with Option, not here.

use thiserror::Error;

use crate::models::InterfaceId;

pub type Result<T> = std::result::Result<T, UveError>;

/// Contract violations on the aggregation path: an upstream add/delete
/// notification was missed, so the caller must stop rather than guess.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UveError {
    #[error("no UVE entry for vm {vm}")]
    VmNotFound { vm: String },

    #[error("interface {interface} is not tracked by the UVE entry of vm {vm}")]
    InterfaceNotTracked { vm: String, interface: InterfaceId },
}
