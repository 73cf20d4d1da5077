//! Cloud provider integration for hoist.
//!
//! A typed client for the Google Cloud APIs needed to stand up a single
//! application VM and its perimeter:
//!
//! - **Service Usage** - enabling the required APIs
//! - **IAM** - the VM service account and its project roles
//! - **Compute Engine** - firewall rules, a reserved static IP, the instance
//! - **Cloud DNS** - an optional A record pointing at the static IP
//!
//! All calls are issued through the [`CloudProvider`] trait so the
//! provisioning logic can run against the real API or a fake.
//!
//! ## Idempotency contract
//!
//! - `get_*` returns [`CloudProviderError::NotFound`] for a missing resource
//!   (see [`ResultExt::found`]).
//! - `create_*` returns [`CloudProviderError::AlreadyExists`] on a name clash.
//! - `delete_*` succeeds when the resource is already gone.

pub mod providers;

pub use providers::{
    gcp, AddressStatus, CloudProvider, CloudProviderError, CreateInstanceRequest, DnsRecord,
    FirewallRule, Instance, InstanceStatus, PortRule, ResultExt, ServiceAccount, StaticAddress,
    STARTUP_SCRIPT_KEY,
};

#[cfg(feature = "mock")]
pub use providers::MockCloudProvider;
