//! Cloud provider trait and common types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during cloud provider operations.
#[derive(Error, Debug)]
pub enum CloudProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource with the same name already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// A long-running operation finished with an error.
    #[error("Operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The API serving the resource is not enabled in the project.
    #[error("API not enabled: {0}")]
    ServiceDisabled(String),

    /// Quota exceeded.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl CloudProviderError {
    /// Whether this error means the resource is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error means the resource is already present.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Whether the owning API is disabled, so the resource cannot exist.
    #[must_use]
    pub fn is_service_disabled(&self) -> bool {
        matches!(self, Self::ServiceDisabled(_))
    }
}

/// Conversions that turn the "expected" failures of idempotent calls into values.
pub trait ResultExt<T> {
    /// Map [`CloudProviderError::NotFound`] to `Ok(None)`.
    ///
    /// # Errors
    /// Any other error is passed through.
    fn found(self) -> Result<Option<T>, CloudProviderError>;
}

impl<T> ResultExt<T> for Result<T, CloudProviderError> {
    fn found(self) -> Result<Option<T>, CloudProviderError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Identity types
// ============================================================================

/// A service account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// Account id (the part before `@`).
    pub account_id: String,
    /// Full email address.
    pub email: String,
    /// Display name.
    pub display_name: Option<String>,
}

impl ServiceAccount {
    /// IAM policy member string for this account.
    #[must_use]
    pub fn member(&self) -> String {
        format!("serviceAccount:{}", self.email)
    }
}

// ============================================================================
// Network types
// ============================================================================

/// Allowed protocol/ports pair of a firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRule {
    /// Protocol, e.g. "tcp".
    pub protocol: String,
    /// Ports or port ranges.
    pub ports: Vec<String>,
}

impl PortRule {
    /// TCP ports.
    #[must_use]
    pub fn tcp(ports: &[u16]) -> Self {
        Self {
            protocol: "tcp".to_string(),
            ports: ports.iter().map(ToString::to_string).collect(),
        }
    }
}

/// An ingress firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    /// Rule name.
    pub name: String,
    /// Network name.
    pub network: String,
    /// Human readable description.
    pub description: Option<String>,
    /// Allowed traffic.
    pub allowed: Vec<PortRule>,
    /// Source CIDR ranges.
    pub source_ranges: Vec<String>,
    /// Target network tags.
    pub target_tags: Vec<String>,
}

impl FirewallRule {
    /// Every exposed port, flattened and sorted.
    #[must_use]
    pub fn exposed_ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self
            .allowed
            .iter()
            .flat_map(|rule| rule.ports.iter().cloned())
            .collect();
        ports.sort();
        ports
    }

    /// Fields that differ from `other`, ignoring ordering.
    #[must_use]
    pub fn differences(&self, other: &Self) -> Vec<String> {
        let mut changes = Vec::new();

        if self.exposed_ports() != other.exposed_ports() {
            changes.push(format!(
                "ports: [{}] -> [{}]",
                other.exposed_ports().join(","),
                self.exposed_ports().join(",")
            ));
        }
        if sorted(&self.source_ranges) != sorted(&other.source_ranges) {
            changes.push(format!(
                "source_ranges: [{}] -> [{}]",
                other.source_ranges.join(","),
                self.source_ranges.join(",")
            ));
        }
        if sorted(&self.target_tags) != sorted(&other.target_tags) {
            changes.push(format!(
                "target_tags: [{}] -> [{}]",
                other.target_tags.join(","),
                self.target_tags.join(",")
            ));
        }

        changes
    }
}

fn sorted(values: &[String]) -> Vec<String> {
    let mut values = values.to_vec();
    values.sort();
    values
}

/// Static address status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    /// Being reserved.
    Reserving,
    /// Reserved, not attached.
    Reserved,
    /// Attached to a resource.
    InUse,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reserving => write!(f, "reserving"),
            Self::Reserved => write!(f, "reserved"),
            Self::InUse => write!(f, "in_use"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A reserved external address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticAddress {
    /// Address resource name.
    pub name: String,
    /// Region.
    pub region: String,
    /// The IPv4 address, once allocated.
    pub address: Option<String>,
    /// Current status.
    pub status: AddressStatus,
}

/// A DNS resource record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Fully qualified name, with trailing dot.
    pub name: String,
    /// Record type, e.g. "A".
    pub record_type: String,
    /// TTL in seconds.
    pub ttl: u32,
    /// Record data.
    pub rrdatas: Vec<String>,
}

// ============================================================================
// Instance (VM) types
// ============================================================================

/// Instance (VM) status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance is pending creation.
    Pending,
    /// Instance is running.
    Running,
    /// Instance is stopped.
    Stopped,
    /// Instance is being terminated.
    Terminating,
    /// Instance is terminated.
    Terminated,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Terminating => write!(f, "terminating"),
            Self::Terminated => write!(f, "terminated"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A virtual machine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Unique instance identifier.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Current status.
    pub status: InstanceStatus,
    /// Machine type.
    pub instance_type: String,
    /// Zone.
    pub zone: String,
    /// Public IPv4 address.
    pub public_ip: Option<String>,
    /// Private IPv4 address.
    pub private_ip: Option<String>,
    /// Network tags.
    pub tags: Vec<String>,
    /// Attached service account email.
    pub service_account: Option<String>,
    /// Instance metadata items.
    pub metadata: BTreeMap<String, String>,
    /// When the instance was created.
    pub created_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// The startup script carried in metadata, if any.
    #[must_use]
    pub fn startup_script(&self) -> Option<&str> {
        self.metadata.get(STARTUP_SCRIPT_KEY).map(String::as_str)
    }
}

/// Metadata key the guest agent executes on every boot.
pub const STARTUP_SCRIPT_KEY: &str = "startup-script";

/// Request to create a new instance (VM).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Instance name.
    pub name: String,
    /// Machine type, e.g. "e2-standard-4".
    pub instance_type: String,
    /// Boot image.
    pub image: String,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Network name.
    pub network: String,
    /// Reserved external address to attach (IP literal).
    pub static_ip: Option<String>,
    /// Network tags (firewall targets).
    pub tags: Vec<String>,
    /// Service account email.
    pub service_account: Option<String>,
    /// Startup script.
    pub startup_script: Option<String>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
}

/// Trait for cloud providers.
///
/// Every resource lives in the project and default zone the provider was
/// built with. `get_*` calls return [`CloudProviderError::NotFound`] for
/// missing resources, `create_*` calls return
/// [`CloudProviderError::AlreadyExists`] on a name conflict and `delete_*`
/// calls succeed when the resource is already gone.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CloudProvider: Send + Sync {
    // ========================================================================
    // Service enablement
    // ========================================================================

    /// Whether the API (e.g. "compute.googleapis.com") is enabled.
    async fn is_service_enabled(&self, service: &str) -> Result<bool, CloudProviderError>;

    /// Enable an API and wait for the operation to finish.
    async fn enable_service(&self, service: &str) -> Result<(), CloudProviderError>;

    // ========================================================================
    // Identity
    // ========================================================================

    /// Get a service account by account id.
    async fn get_service_account(
        &self,
        account_id: &str,
    ) -> Result<ServiceAccount, CloudProviderError>;

    /// Create a service account.
    async fn create_service_account(
        &self,
        account_id: &str,
        display_name: &str,
    ) -> Result<ServiceAccount, CloudProviderError>;

    /// Delete a service account.
    async fn delete_service_account(&self, account_id: &str) -> Result<(), CloudProviderError>;

    /// Add project-level role bindings for `member`. Existing bindings are kept.
    async fn grant_project_roles(
        &self,
        member: &str,
        roles: &[String],
    ) -> Result<(), CloudProviderError>;

    // ========================================================================
    // Firewall
    // ========================================================================

    /// Get a firewall rule by name.
    async fn get_firewall(&self, name: &str) -> Result<FirewallRule, CloudProviderError>;

    /// Create a firewall rule.
    async fn create_firewall(&self, rule: &FirewallRule) -> Result<(), CloudProviderError>;

    /// Replace the ports, sources and targets of an existing rule.
    async fn update_firewall(&self, rule: &FirewallRule) -> Result<(), CloudProviderError>;

    /// Delete a firewall rule.
    async fn delete_firewall(&self, name: &str) -> Result<(), CloudProviderError>;

    // ========================================================================
    // Static addresses
    // ========================================================================

    /// Get a regional static address by name.
    async fn get_address(&self, name: &str) -> Result<StaticAddress, CloudProviderError>;

    /// Reserve a regional static address.
    async fn reserve_address(&self, name: &str) -> Result<StaticAddress, CloudProviderError>;

    /// Release a static address.
    async fn release_address(&self, name: &str) -> Result<(), CloudProviderError>;

    // ========================================================================
    // Instance (VM) operations
    // ========================================================================

    /// Get an instance by name.
    async fn get_instance(&self, name: &str) -> Result<Instance, CloudProviderError>;

    /// Create an instance and wait for the insert operation.
    async fn create_instance(
        &self,
        req: CreateInstanceRequest,
    ) -> Result<Instance, CloudProviderError>;

    /// Replace the startup script in the instance metadata.
    async fn update_startup_script(
        &self,
        name: &str,
        script: &str,
    ) -> Result<(), CloudProviderError>;

    /// Wait for instance to be running.
    async fn wait_instance_ready(
        &self,
        name: &str,
        timeout_secs: u64,
    ) -> Result<Instance, CloudProviderError>;

    /// Delete an instance and wait for the operation.
    async fn delete_instance(&self, name: &str) -> Result<(), CloudProviderError>;

    // ========================================================================
    // DNS
    // ========================================================================

    /// Get a record set in a managed zone.
    async fn get_dns_record(
        &self,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> Result<DnsRecord, CloudProviderError>;

    /// Create a record set in a managed zone.
    async fn create_dns_record(
        &self,
        zone: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudProviderError>;

    /// Delete a record set.
    async fn delete_dns_record(
        &self,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> Result<(), CloudProviderError>;
}
