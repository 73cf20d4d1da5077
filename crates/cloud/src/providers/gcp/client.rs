//! GCP API client implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use tracing::{debug, info, warn};

use super::models::{
    scopes, AccessConfigDefinition, AttachedDiskDefinition,
    CreateInstanceRequest as GceCreateRequest, CreateServiceAccountRequest, GceAddress,
    GceAllowed, GceFirewall, GceInstance, IamPolicy, IamServiceAccount, InitializeParams,
    InstanceMetadata, LongRunningOperation, MetadataItem, NetworkInterfaceDefinition, Operation,
    ResourceRecordSet, ServiceAccountBody, ServiceAccountRef, ServiceState, SetIamPolicyRequest,
    Tags,
};
use crate::providers::traits::{
    AddressStatus, CloudProvider, CloudProviderError, CreateInstanceRequest, DnsRecord,
    FirewallRule, Instance, InstanceStatus, PortRule, ServiceAccount, StaticAddress,
    STARTUP_SCRIPT_KEY,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Polling interval when waiting for operations and resources.
const POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound for a single long-running operation.
const OPERATION_TIMEOUT_SECS: u64 = 600;

/// Base URLs of the Google APIs used by the client.
#[derive(Debug, Clone)]
struct Endpoints {
    compute: String,
    iam: String,
    service_usage: String,
    resource_manager: String,
    dns: String,
}

impl Endpoints {
    fn google() -> Self {
        Self {
            compute: "https://compute.googleapis.com".to_string(),
            iam: "https://iam.googleapis.com".to_string(),
            service_usage: "https://serviceusage.googleapis.com".to_string(),
            resource_manager: "https://cloudresourcemanager.googleapis.com".to_string(),
            dns: "https://dns.googleapis.com".to_string(),
        }
    }

    fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            compute: base.clone(),
            iam: base.clone(),
            service_usage: base.clone(),
            resource_manager: base.clone(),
            dns: base,
        }
    }
}

/// GCP cloud provider.
#[derive(Clone)]
pub struct Gcp {
    /// HTTP client.
    client: Client,
    /// Project ID.
    project_id: String,
    /// Access token (from service account or user).
    access_token: String,
    /// Default zone.
    zone: String,
    /// API base URLs.
    endpoints: Endpoints,
    /// Interval between operation polls.
    poll_interval: Duration,
}

impl Gcp {
    /// Create a new GCP provider.
    ///
    /// # Arguments
    /// * `project_id` - GCP project ID
    /// * `access_token` - `OAuth2` access token
    /// * `zone` - Default zone (e.g., "us-central1-a")
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(
        project_id: impl Into<String>,
        access_token: impl Into<String>,
        zone: impl Into<String>,
    ) -> Result<Self, CloudProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(CloudProviderError::Http)?;

        Ok(Self {
            client,
            project_id: project_id.into(),
            access_token: access_token.into(),
            zone: zone.into(),
            endpoints: Endpoints::google(),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
        })
    }

    /// Send every API call to `base_url` instead of the Google endpoints.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.endpoints = Endpoints::single(base_url);
        self
    }

    /// Override the operation polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Project the client operates on.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Default zone.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Region of the default zone.
    #[must_use]
    pub fn region(&self) -> String {
        Self::zone_to_region(&self.zone)
    }

    /// Get region from zone.
    fn zone_to_region(zone: &str) -> String {
        // Remove the zone suffix (e.g., "us-central1-a" -> "us-central1")
        zone.rsplit_once('-')
            .map_or_else(|| zone.to_string(), |(region, _)| region.to_string())
    }

    /// Last path segment of a resource URL.
    fn short_name(url: &str) -> &str {
        url.rsplit('/').next().unwrap_or(url)
    }

    fn compute_url(&self, path: &str) -> String {
        format!(
            "{}/compute/v1/projects/{}/{path}",
            self.endpoints.compute, self.project_id
        )
    }

    fn zonal_url(&self, path: &str) -> String {
        self.compute_url(&format!("zones/{}/{path}", self.zone))
    }

    fn regional_url(&self, path: &str) -> String {
        self.compute_url(&format!("regions/{}/{path}", self.region()))
    }

    fn global_url(&self, path: &str) -> String {
        self.compute_url(&format!("global/{path}"))
    }

    fn service_account_email(&self, account_id: &str) -> String {
        format!("{account_id}@{}.iam.gserviceaccount.com", self.project_id)
    }

    fn service_account_url(&self, account_id: &str) -> String {
        format!(
            "{}/v1/projects/{}/serviceAccounts/{}",
            self.endpoints.iam,
            self.project_id,
            self.service_account_email(account_id)
        )
    }

    fn rrsets_url(&self, zone: &str) -> String {
        format!(
            "{}/dns/v1/projects/{}/managedZones/{zone}/rrsets",
            self.endpoints.dns, self.project_id
        )
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, CloudProviderError> {
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated request with a JSON body.
    async fn send_json<T, B>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<T, CloudProviderError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        debug!(url = %url, method = %method, "JSON request");

        let response = self
            .client
            .request(method, url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Send a Compute mutation and wait for the resulting operation.
    async fn mutate<B: serde::Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<(), CloudProviderError> {
        let operation: Operation = self.send_json(method, url, body).await?;
        self.wait_operation(operation).await
    }

    /// Make an authenticated DELETE request. A missing resource is success.
    async fn delete_raw(&self, url: &str) -> Result<Option<String>, CloudProviderError> {
        debug!(url = %url, "DELETE request");

        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(Some(text))
        } else if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Resource already absent");
            Ok(None)
        } else {
            Err(Self::status_error(status, text))
        }
    }

    /// Delete a Compute resource and wait for the operation.
    async fn delete_compute(&self, url: &str) -> Result<(), CloudProviderError> {
        let Some(body) = self.delete_raw(url).await? else {
            return Ok(());
        };
        let operation: Operation = serde_json::from_str(&body)?;
        match self.wait_operation(operation).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Handle API response.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudProviderError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                CloudProviderError::Serialization(e)
            })
        } else {
            Err(Self::status_error(status, text))
        }
    }

    fn status_error(status: StatusCode, text: String) -> CloudProviderError {
        match status {
            StatusCode::NOT_FOUND => CloudProviderError::NotFound(text),
            StatusCode::CONFLICT => CloudProviderError::AlreadyExists(text),
            StatusCode::FORBIDDEN if text.contains("SERVICE_DISABLED") => {
                CloudProviderError::ServiceDisabled(text)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CloudProviderError::Auth(text),
            StatusCode::TOO_MANY_REQUESTS => CloudProviderError::QuotaExceeded(text),
            _ => CloudProviderError::Api {
                status: status.as_u16(),
                message: text,
            },
        }
    }

    /// URL to poll a Compute operation at.
    fn operation_url(&self, operation: &Operation) -> String {
        if let Some(zone) = &operation.zone {
            self.compute_url(&format!(
                "zones/{}/operations/{}",
                Self::short_name(zone),
                operation.name
            ))
        } else if let Some(region) = &operation.region {
            self.compute_url(&format!(
                "regions/{}/operations/{}",
                Self::short_name(region),
                operation.name
            ))
        } else {
            self.global_url(&format!("operations/{}", operation.name))
        }
    }

    /// Poll a Compute operation until it is done.
    async fn wait_operation(&self, mut operation: Operation) -> Result<(), CloudProviderError> {
        let start = std::time::Instant::now();
        let url = self.operation_url(&operation);

        loop {
            if operation.status == "DONE" {
                return match operation.error {
                    None => Ok(()),
                    Some(error) => {
                        let message = error.message();
                        match error.code() {
                            Some("RESOURCE_ALREADY_EXISTS") => {
                                Err(CloudProviderError::AlreadyExists(message))
                            }
                            Some("RESOURCE_NOT_FOUND") => Err(CloudProviderError::NotFound(message)),
                            Some(code) if code.starts_with("QUOTA") => {
                                Err(CloudProviderError::QuotaExceeded(message))
                            }
                            _ => Err(CloudProviderError::OperationFailed {
                                operation: operation.name,
                                message,
                            }),
                        }
                    }
                };
            }

            if start.elapsed() > Duration::from_secs(OPERATION_TIMEOUT_SECS) {
                return Err(CloudProviderError::Timeout(OPERATION_TIMEOUT_SECS));
            }

            debug!(
                operation = %operation.name,
                status = %operation.status,
                elapsed_secs = start.elapsed().as_secs(),
                "Waiting for operation"
            );

            tokio::time::sleep(self.poll_interval).await;
            operation = self.get(&url).await?;
        }
    }

    /// Poll a Service Usage operation until it is done.
    async fn wait_service_operation(
        &self,
        mut operation: LongRunningOperation,
    ) -> Result<(), CloudProviderError> {
        let start = std::time::Instant::now();

        loop {
            if operation.done {
                return match operation.error {
                    None => Ok(()),
                    Some(error) => Err(CloudProviderError::OperationFailed {
                        operation: operation.name,
                        message: error.message.unwrap_or_default(),
                    }),
                };
            }

            if start.elapsed() > Duration::from_secs(OPERATION_TIMEOUT_SECS) {
                return Err(CloudProviderError::Timeout(OPERATION_TIMEOUT_SECS));
            }

            tokio::time::sleep(self.poll_interval).await;
            let url = format!("{}/v1/{}", self.endpoints.service_usage, operation.name);
            operation = self.get(&url).await?;
        }
    }

    async fn get_gce_instance(&self, name: &str) -> Result<GceInstance, CloudProviderError> {
        self.get(&self.zonal_url(&format!("instances/{name}"))).await
    }

    /// Convert GCE instance to our type.
    fn to_instance(instance: &GceInstance) -> Instance {
        let status = match instance.status.as_str() {
            "PROVISIONING" | "STAGING" => InstanceStatus::Pending,
            "RUNNING" => InstanceStatus::Running,
            "STOPPED" | "SUSPENDED" => InstanceStatus::Stopped,
            "STOPPING" | "SUSPENDING" => InstanceStatus::Terminating,
            "TERMINATED" => InstanceStatus::Terminated,
            _ => InstanceStatus::Unknown,
        };

        let public_ip = instance
            .network_interfaces
            .first()
            .and_then(|ni| ni.access_configs.first())
            .and_then(|ac| ac.nat_i_p.clone());

        let private_ip = instance
            .network_interfaces
            .first()
            .and_then(|ni| ni.network_i_p.clone());

        let metadata = instance
            .metadata
            .as_ref()
            .map(|m| {
                m.items
                    .iter()
                    .map(|item| (item.key.clone(), item.value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Instance {
            id: instance.id.clone(),
            name: instance.name.clone(),
            status,
            instance_type: Self::short_name(&instance.machine_type).to_string(),
            zone: Self::short_name(&instance.zone).to_string(),
            public_ip,
            private_ip,
            tags: instance
                .tags
                .as_ref()
                .map(|t| t.items.clone())
                .unwrap_or_default(),
            service_account: instance.service_accounts.first().map(|sa| sa.email.clone()),
            metadata,
            created_at: instance
                .creation_timestamp
                .as_ref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
        }
    }

    fn to_firewall(firewall: GceFirewall) -> FirewallRule {
        FirewallRule {
            name: firewall.name,
            network: firewall
                .network
                .as_deref()
                .map(Self::short_name)
                .unwrap_or("default")
                .to_string(),
            description: firewall.description,
            allowed: firewall
                .allowed
                .into_iter()
                .map(|a| PortRule {
                    protocol: a.ip_protocol,
                    ports: a.ports,
                })
                .collect(),
            source_ranges: firewall.source_ranges,
            target_tags: firewall.target_tags,
        }
    }

    fn from_firewall(rule: &FirewallRule) -> GceFirewall {
        GceFirewall {
            name: rule.name.clone(),
            network: Some(format!("global/networks/{}", rule.network)),
            description: rule.description.clone(),
            direction: Some("INGRESS".to_string()),
            allowed: rule
                .allowed
                .iter()
                .map(|a| GceAllowed {
                    ip_protocol: a.protocol.clone(),
                    ports: a.ports.clone(),
                })
                .collect(),
            source_ranges: rule.source_ranges.clone(),
            target_tags: rule.target_tags.clone(),
        }
    }

    fn to_address(&self, address: GceAddress) -> StaticAddress {
        let status = match address.status.as_deref() {
            Some("RESERVING") => AddressStatus::Reserving,
            Some("RESERVED") => AddressStatus::Reserved,
            Some("IN_USE") => AddressStatus::InUse,
            _ => AddressStatus::Unknown,
        };

        StaticAddress {
            name: address.name,
            region: address
                .region
                .as_deref()
                .map_or_else(|| self.region(), |r| Self::short_name(r).to_string()),
            address: address.address,
            status,
        }
    }

    fn to_service_account(account_id: &str, account: IamServiceAccount) -> ServiceAccount {
        ServiceAccount {
            account_id: account_id.to_string(),
            email: account.email,
            display_name: account.display_name,
        }
    }
}

#[async_trait]
impl CloudProvider for Gcp {
    // ========================================================================
    // Service enablement
    // ========================================================================

    async fn is_service_enabled(&self, service: &str) -> Result<bool, CloudProviderError> {
        let url = format!(
            "{}/v1/projects/{}/services/{service}",
            self.endpoints.service_usage, self.project_id
        );

        let state: ServiceState = self.get(&url).await?;
        Ok(state.state == "ENABLED")
    }

    async fn enable_service(&self, service: &str) -> Result<(), CloudProviderError> {
        info!(service = %service, "Enabling API");

        let url = format!(
            "{}/v1/projects/{}/services/{service}:enable",
            self.endpoints.service_usage, self.project_id
        );

        let operation: LongRunningOperation =
            self.send_json(Method::POST, &url, &json!({})).await?;
        self.wait_service_operation(operation).await?;

        info!(service = %service, "API enabled");
        Ok(())
    }

    // ========================================================================
    // Identity
    // ========================================================================

    async fn get_service_account(
        &self,
        account_id: &str,
    ) -> Result<ServiceAccount, CloudProviderError> {
        let account: IamServiceAccount = self.get(&self.service_account_url(account_id)).await?;
        Ok(Self::to_service_account(account_id, account))
    }

    async fn create_service_account(
        &self,
        account_id: &str,
        display_name: &str,
    ) -> Result<ServiceAccount, CloudProviderError> {
        info!(account_id = %account_id, "Creating service account");

        let url = format!(
            "{}/v1/projects/{}/serviceAccounts",
            self.endpoints.iam, self.project_id
        );
        let body = CreateServiceAccountRequest {
            account_id: account_id.to_string(),
            service_account: ServiceAccountBody {
                display_name: display_name.to_string(),
            },
        };

        let account: IamServiceAccount = self.send_json(Method::POST, &url, &body).await?;

        info!(email = %account.email, "Service account created");
        Ok(Self::to_service_account(account_id, account))
    }

    async fn delete_service_account(&self, account_id: &str) -> Result<(), CloudProviderError> {
        info!(account_id = %account_id, "Deleting service account");
        self.delete_raw(&self.service_account_url(account_id))
            .await
            .map(|_| ())
    }

    async fn grant_project_roles(
        &self,
        member: &str,
        roles: &[String],
    ) -> Result<(), CloudProviderError> {
        let base = format!(
            "{}/v1/projects/{}",
            self.endpoints.resource_manager, self.project_id
        );

        let mut policy: IamPolicy = self
            .send_json(Method::POST, &format!("{base}:getIamPolicy"), &json!({}))
            .await?;

        if !policy.add_member(member, roles) {
            debug!(member = %member, "Role bindings already present");
            return Ok(());
        }

        info!(member = %member, roles = ?roles, "Granting project roles");
        let _: IamPolicy = self
            .send_json(
                Method::POST,
                &format!("{base}:setIamPolicy"),
                &SetIamPolicyRequest { policy },
            )
            .await?;
        Ok(())
    }

    // ========================================================================
    // Firewall
    // ========================================================================

    async fn get_firewall(&self, name: &str) -> Result<FirewallRule, CloudProviderError> {
        let firewall: GceFirewall = self.get(&self.global_url(&format!("firewalls/{name}"))).await?;
        Ok(Self::to_firewall(firewall))
    }

    async fn create_firewall(&self, rule: &FirewallRule) -> Result<(), CloudProviderError> {
        info!(
            name = %rule.name,
            ports = ?rule.exposed_ports(),
            sources = ?rule.source_ranges,
            "Creating firewall rule"
        );

        self.mutate(
            Method::POST,
            &self.global_url("firewalls"),
            &Self::from_firewall(rule),
        )
        .await
    }

    async fn update_firewall(&self, rule: &FirewallRule) -> Result<(), CloudProviderError> {
        info!(name = %rule.name, "Updating firewall rule");

        self.mutate(
            Method::PATCH,
            &self.global_url(&format!("firewalls/{}", rule.name)),
            &Self::from_firewall(rule),
        )
        .await
    }

    async fn delete_firewall(&self, name: &str) -> Result<(), CloudProviderError> {
        info!(name = %name, "Deleting firewall rule");
        self.delete_compute(&self.global_url(&format!("firewalls/{name}")))
            .await
    }

    // ========================================================================
    // Static addresses
    // ========================================================================

    async fn get_address(&self, name: &str) -> Result<StaticAddress, CloudProviderError> {
        let address: GceAddress = self
            .get(&self.regional_url(&format!("addresses/{name}")))
            .await?;
        Ok(self.to_address(address))
    }

    async fn reserve_address(&self, name: &str) -> Result<StaticAddress, CloudProviderError> {
        info!(name = %name, region = %self.region(), "Reserving static IP");

        let body = GceAddress {
            name: name.to_string(),
            address: None,
            status: None,
            region: None,
            network_tier: Some("PREMIUM".to_string()),
        };
        self.mutate(Method::POST, &self.regional_url("addresses"), &body)
            .await?;

        let address = self.get_address(name).await?;
        info!(
            name = %name,
            address = address.address.as_deref().unwrap_or("pending"),
            "Static IP reserved"
        );
        Ok(address)
    }

    async fn release_address(&self, name: &str) -> Result<(), CloudProviderError> {
        info!(name = %name, "Releasing static IP");
        self.delete_compute(&self.regional_url(&format!("addresses/{name}")))
            .await
    }

    // ========================================================================
    // Compute Engine (Instance) operations
    // ========================================================================

    async fn get_instance(&self, name: &str) -> Result<Instance, CloudProviderError> {
        let instance = self.get_gce_instance(name).await?;
        Ok(Self::to_instance(&instance))
    }

    async fn create_instance(
        &self,
        req: CreateInstanceRequest,
    ) -> Result<Instance, CloudProviderError> {
        info!(
            name = %req.name,
            instance_type = %req.instance_type,
            zone = %self.zone,
            "Creating Compute Engine instance"
        );

        let zone = &self.zone;
        let metadata = req.startup_script.map(|script| InstanceMetadata {
            fingerprint: None,
            items: vec![MetadataItem {
                key: STARTUP_SCRIPT_KEY.to_string(),
                value: script,
            }],
        });

        let body = GceCreateRequest {
            name: req.name.clone(),
            machine_type: format!("zones/{zone}/machineTypes/{}", req.instance_type),
            disks: vec![AttachedDiskDefinition {
                boot: true,
                auto_delete: true,
                initialize_params: InitializeParams {
                    source_image: req.image,
                    disk_size_gb: req.disk_size_gb.to_string(),
                    disk_type: Some(format!("zones/{zone}/diskTypes/pd-balanced")),
                },
            }],
            network_interfaces: vec![NetworkInterfaceDefinition {
                network: format!("global/networks/{}", req.network),
                access_configs: vec![AccessConfigDefinition {
                    access_type: "ONE_TO_ONE_NAT".to_string(),
                    name: "External NAT".to_string(),
                    nat_i_p: req.static_ip,
                }],
            }],
            tags: Tags { items: req.tags },
            service_accounts: req
                .service_account
                .into_iter()
                .map(|email| ServiceAccountRef {
                    email,
                    scopes: vec![scopes::CLOUD_PLATFORM.to_string()],
                })
                .collect(),
            labels: req.labels,
            metadata,
        };

        self.mutate(Method::POST, &self.zonal_url("instances"), &body)
            .await?;

        let instance = self.get_instance(&req.name).await?;
        info!(instance_id = %instance.id, "Instance created");
        Ok(instance)
    }

    async fn update_startup_script(
        &self,
        name: &str,
        script: &str,
    ) -> Result<(), CloudProviderError> {
        info!(instance = %name, "Updating startup script metadata");

        let instance = self.get_gce_instance(name).await?;
        let current = instance.metadata.unwrap_or(InstanceMetadata {
            fingerprint: None,
            items: Vec::new(),
        });

        let mut items: BTreeMap<String, String> = current
            .items
            .into_iter()
            .map(|item| (item.key, item.value))
            .collect();
        items.insert(STARTUP_SCRIPT_KEY.to_string(), script.to_string());

        let body = InstanceMetadata {
            fingerprint: current.fingerprint,
            items: items
                .into_iter()
                .map(|(key, value)| MetadataItem { key, value })
                .collect(),
        };

        self.mutate(
            Method::POST,
            &self.zonal_url(&format!("instances/{name}/setMetadata")),
            &body,
        )
        .await
    }

    async fn wait_instance_ready(
        &self,
        name: &str,
        timeout_secs: u64,
    ) -> Result<Instance, CloudProviderError> {
        info!(instance = %name, timeout_secs, "Waiting for instance to be ready");

        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(timeout_secs);

        loop {
            let instance = self.get_instance(name).await?;

            debug!(
                instance = %name,
                status = %instance.status,
                elapsed_secs = start.elapsed().as_secs(),
                "Polling instance status"
            );

            if instance.status == InstanceStatus::Running {
                info!(instance = %name, "Instance is ready");
                return Ok(instance);
            }

            if instance.status == InstanceStatus::Terminated {
                return Err(CloudProviderError::Api {
                    status: 500,
                    message: "Instance was terminated".to_string(),
                });
            }

            if start.elapsed() > timeout {
                return Err(CloudProviderError::Timeout(timeout_secs));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn delete_instance(&self, name: &str) -> Result<(), CloudProviderError> {
        info!(instance = %name, "Deleting instance");
        self.delete_compute(&self.zonal_url(&format!("instances/{name}")))
            .await?;
        info!(instance = %name, "Instance deleted");
        Ok(())
    }

    // ========================================================================
    // DNS
    // ========================================================================

    async fn get_dns_record(
        &self,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> Result<DnsRecord, CloudProviderError> {
        let url = format!("{}/{name}/{record_type}", self.rrsets_url(zone));
        let set: ResourceRecordSet = self.get(&url).await?;
        Ok(DnsRecord {
            name: set.name,
            record_type: set.record_type,
            ttl: set.ttl,
            rrdatas: set.rrdatas,
        })
    }

    async fn create_dns_record(
        &self,
        zone: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudProviderError> {
        info!(zone = %zone, name = %record.name, data = ?record.rrdatas, "Creating DNS record");

        let body = ResourceRecordSet {
            name: record.name.clone(),
            record_type: record.record_type.clone(),
            ttl: record.ttl,
            rrdatas: record.rrdatas.clone(),
        };
        let _: ResourceRecordSet = self
            .send_json(Method::POST, &self.rrsets_url(zone), &body)
            .await?;
        Ok(())
    }

    async fn delete_dns_record(
        &self,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> Result<(), CloudProviderError> {
        info!(zone = %zone, name = %name, "Deleting DNS record");
        let url = format!("{}/{name}/{record_type}", self.rrsets_url(zone));
        self.delete_raw(&url).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::gcp::models::{AccessConfig, NetworkInterface};

    fn gcp() -> Gcp {
        Gcp::new("my-project", "token", "us-central1-a").unwrap()
    }

    #[test]
    fn test_zone_to_region() {
        assert_eq!(Gcp::zone_to_region("us-central1-a"), "us-central1");
        assert_eq!(Gcp::zone_to_region("europe-west1-b"), "europe-west1");
    }

    #[test]
    fn test_instance_status_mapping() {
        let gce = GceInstance {
            id: "123456789".to_string(),
            name: "app-server".to_string(),
            zone: "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a".to_string(),
            machine_type: "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a/machineTypes/e2-standard-4".to_string(),
            status: "RUNNING".to_string(),
            network_interfaces: vec![NetworkInterface {
                network: None,
                network_i_p: Some("10.128.0.2".to_string()),
                access_configs: vec![AccessConfig {
                    nat_i_p: Some("34.1.2.3".to_string()),
                }],
            }],
            tags: Some(Tags {
                items: vec!["app-server".to_string()],
            }),
            service_accounts: vec![],
            metadata: Some(InstanceMetadata {
                fingerprint: Some("abc".to_string()),
                items: vec![MetadataItem {
                    key: STARTUP_SCRIPT_KEY.to_string(),
                    value: "#!/bin/bash".to_string(),
                }],
            }),
            creation_timestamp: None,
            labels: std::collections::HashMap::new(),
        };

        let converted = Gcp::to_instance(&gce);
        assert_eq!(converted.status, InstanceStatus::Running);
        assert_eq!(converted.id, "123456789");
        assert_eq!(converted.instance_type, "e2-standard-4");
        assert_eq!(converted.zone, "us-central1-a");
        assert_eq!(converted.public_ip.as_deref(), Some("34.1.2.3"));
        assert_eq!(converted.startup_script(), Some("#!/bin/bash"));
    }

    #[test]
    fn test_operation_url_scopes() {
        let gcp = gcp();
        let zonal = Operation {
            name: "op-1".to_string(),
            status: "RUNNING".to_string(),
            zone: Some("https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a".to_string()),
            region: None,
            target_link: None,
            operation_type: Some("insert".to_string()),
            error: None,
        };
        assert!(gcp
            .operation_url(&zonal)
            .ends_with("/projects/my-project/zones/us-central1-a/operations/op-1"));

        let global = Operation {
            zone: None,
            ..zonal
        };
        assert!(gcp
            .operation_url(&global)
            .ends_with("/projects/my-project/global/operations/op-1"));
    }

    #[test]
    fn test_firewall_conversion_keeps_ports() {
        let rule = FirewallRule {
            name: "app-server-allow-app".to_string(),
            network: "default".to_string(),
            description: None,
            allowed: vec![PortRule::tcp(&[3000, 8000])],
            source_ranges: vec!["0.0.0.0/0".to_string()],
            target_tags: vec!["app-server".to_string()],
        };
        let gce = Gcp::from_firewall(&rule);
        assert_eq!(gce.network.as_deref(), Some("global/networks/default"));
        assert_eq!(gce.direction.as_deref(), Some("INGRESS"));
        assert_eq!(Gcp::to_firewall(gce), rule);
    }
}
