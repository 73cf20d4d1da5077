//! GCP API request and response models.

use serde::{Deserialize, Serialize};

// ============================================================================
// Compute Engine types
// ============================================================================

/// GCE instance information.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstance {
    /// Instance ID.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Zone (URL).
    pub zone: String,
    /// Machine type (URL).
    pub machine_type: String,
    /// Status.
    pub status: String,
    /// Network interfaces.
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    /// Network tags.
    pub tags: Option<Tags>,
    /// Service accounts.
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccountRef>,
    /// Metadata.
    pub metadata: Option<InstanceMetadata>,
    /// Creation timestamp.
    pub creation_timestamp: Option<String>,
    /// Labels.
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
}

/// Network interface.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Network (URL).
    pub network: Option<String>,
    /// Network IP (internal).
    pub network_i_p: Option<String>,
    /// Access configs (for external IP).
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

/// Access configuration (external IP).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    /// External NAT IP.
    pub nat_i_p: Option<String>,
}

/// Network tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tags {
    /// Tag values.
    #[serde(default)]
    pub items: Vec<String>,
}

/// Service account attached to an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountRef {
    /// Account email.
    pub email: String,
    /// OAuth scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Instance metadata with its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceMetadata {
    /// Fingerprint required for updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Metadata items.
    #[serde(default)]
    pub items: Vec<MetadataItem>,
}

/// Metadata item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataItem {
    /// Key.
    pub key: String,
    /// Value.
    #[serde(default)]
    pub value: String,
}

/// Create instance request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    /// Instance name.
    pub name: String,
    /// Machine type (URL).
    pub machine_type: String,
    /// Disks.
    pub disks: Vec<AttachedDiskDefinition>,
    /// Network interfaces.
    pub network_interfaces: Vec<NetworkInterfaceDefinition>,
    /// Network tags.
    pub tags: Tags,
    /// Service accounts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<ServiceAccountRef>,
    /// Labels.
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub labels: std::collections::BTreeMap<String, String>,
    /// Metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<InstanceMetadata>,
}

/// Attached disk definition for creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDiskDefinition {
    /// Boot disk.
    pub boot: bool,
    /// Auto delete.
    pub auto_delete: bool,
    /// Initialize params.
    pub initialize_params: InitializeParams,
}

/// Disk initialization parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Source image (URL).
    pub source_image: String,
    /// Disk size in GB.
    pub disk_size_gb: String,
    /// Disk type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
}

/// Network interface definition for creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceDefinition {
    /// Network (URL).
    pub network: String,
    /// Access configs.
    pub access_configs: Vec<AccessConfigDefinition>,
}

/// Access config definition.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfigDefinition {
    /// Access type.
    #[serde(rename = "type")]
    pub access_type: String,
    /// Name.
    pub name: String,
    /// Reserved external IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_i_p: Option<String>,
}

/// Firewall rule as the Compute API represents it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceFirewall {
    /// Rule name.
    pub name: String,
    /// Network (URL or relative path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Direction ("INGRESS").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Allowed protocols/ports.
    #[serde(default)]
    pub allowed: Vec<GceAllowed>,
    /// Source ranges.
    #[serde(default)]
    pub source_ranges: Vec<String>,
    /// Target tags.
    #[serde(default)]
    pub target_tags: Vec<String>,
}

/// Allowed entry of a firewall rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GceAllowed {
    /// Protocol.
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    /// Ports.
    #[serde(default)]
    pub ports: Vec<String>,
}

/// Regional address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceAddress {
    /// Address name.
    pub name: String,
    /// Allocated IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Status ("RESERVING", "RESERVED", "IN_USE").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Region (URL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Network tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_tier: Option<String>,
}

/// GCP operation (async task).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name.
    pub name: String,
    /// Status ("PENDING", "RUNNING", "DONE").
    pub status: String,
    /// Zone (URL) for zonal operations.
    pub zone: Option<String>,
    /// Region (URL) for regional operations.
    pub region: Option<String>,
    /// Target link.
    pub target_link: Option<String>,
    /// Operation type.
    pub operation_type: Option<String>,
    /// Error.
    pub error: Option<OperationError>,
}

/// Operation error.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    /// Errors.
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

/// Operation error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrorDetail {
    /// Error code.
    pub code: Option<String>,
    /// Error message.
    pub message: Option<String>,
}

impl OperationError {
    /// First error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.errors.first().and_then(|e| e.code.as_deref())
    }

    /// All messages joined.
    #[must_use]
    pub fn message(&self) -> String {
        self.errors
            .iter()
            .filter_map(|e| e.message.as_deref())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ============================================================================
// IAM and resource manager types
// ============================================================================

/// IAM service account resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamServiceAccount {
    /// Email.
    pub email: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Unique id.
    pub unique_id: Option<String>,
}

/// Create service account request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceAccountRequest {
    /// Account id.
    pub account_id: String,
    /// Account body.
    pub service_account: ServiceAccountBody,
}

/// Service account body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountBody {
    /// Display name.
    pub display_name: String,
}

/// Project IAM policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IamPolicy {
    /// Policy version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    /// Bindings.
    #[serde(default)]
    pub bindings: Vec<IamBinding>,
    /// Concurrency etag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Role binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IamBinding {
    /// Role.
    pub role: String,
    /// Members.
    #[serde(default)]
    pub members: Vec<String>,
}

impl IamPolicy {
    /// Add `member` to each role, returning whether anything changed.
    pub fn add_member(&mut self, member: &str, roles: &[String]) -> bool {
        let mut changed = false;
        for role in roles {
            if let Some(binding) = self.bindings.iter_mut().find(|b| &b.role == role) {
                if !binding.members.iter().any(|m| m == member) {
                    binding.members.push(member.to_string());
                    changed = true;
                }
            } else {
                self.bindings.push(IamBinding {
                    role: role.clone(),
                    members: vec![member.to_string()],
                });
                changed = true;
            }
        }
        changed
    }
}

/// `setIamPolicy` request body.
#[derive(Debug, Serialize)]
pub struct SetIamPolicyRequest {
    /// Policy.
    pub policy: IamPolicy,
}

// ============================================================================
// Service usage types
// ============================================================================

/// Enabled-state of an API.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceState {
    /// Service resource name.
    pub name: String,
    /// "ENABLED" or "DISABLED".
    pub state: String,
}

/// Long-running operation from Service Usage.
#[derive(Debug, Clone, Deserialize)]
pub struct LongRunningOperation {
    /// Operation name.
    pub name: String,
    /// Whether it is finished.
    #[serde(default)]
    pub done: bool,
    /// Error status.
    pub error: Option<StatusError>,
}

/// Google RPC status.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusError {
    /// Code.
    pub code: Option<i32>,
    /// Message.
    pub message: Option<String>,
}

// ============================================================================
// Cloud DNS types
// ============================================================================

/// Resource record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecordSet {
    /// Record name.
    pub name: String,
    /// Record type.
    #[serde(rename = "type")]
    pub record_type: String,
    /// TTL.
    pub ttl: u32,
    /// Record data.
    #[serde(default)]
    pub rrdatas: Vec<String>,
}

// ============================================================================
// Common GCP types
// ============================================================================

/// OAuth scopes granted to the instance service account.
pub mod scopes {
    /// Full platform scope; IAM roles restrict effective access.
    pub const CLOUD_PLATFORM: &str = "https://www.googleapis.com/auth/cloud-platform";
}

/// Common GCP images.
pub mod images {
    /// Ubuntu 24.04 LTS.
    pub const UBUNTU_24_04: &str =
        "projects/ubuntu-os-cloud/global/images/family/ubuntu-2404-lts-amd64";
    /// Ubuntu 22.04 LTS.
    pub const UBUNTU_22_04: &str = "projects/ubuntu-os-cloud/global/images/family/ubuntu-2204-lts";
    /// Debian 12.
    pub const DEBIAN_12: &str = "projects/debian-cloud/global/images/family/debian-12";
}
