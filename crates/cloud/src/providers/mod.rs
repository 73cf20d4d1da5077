//! Cloud provider abstractions.
//!
//! This module defines the common trait and types for cloud providers.

pub mod gcp;
mod traits;

#[cfg(feature = "mock")]
pub use traits::MockCloudProvider;
pub use traits::{
    AddressStatus, CloudProvider, CloudProviderError, CreateInstanceRequest, DnsRecord,
    FirewallRule, Instance, InstanceStatus, PortRule, ResultExt, ServiceAccount, StaticAddress,
    STARTUP_SCRIPT_KEY,
};

// Re-export provider clients
pub use gcp::Gcp;
