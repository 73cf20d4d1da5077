//! Per-resource observe, create, update and delete.
//!
//! Both the imperative setup and the declarative plan run through these
//! functions, so the two paths always create resources the same way.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use hoist_cloud::{
    CloudProvider, CloudProviderError, CreateInstanceRequest, DnsRecord, FirewallRule, Instance,
    InstanceStatus, ResultExt, ServiceAccount, StaticAddress,
};

use crate::blueprint::{DesiredResource, InstanceSpec};
use crate::firewall::is_open_to_internet;
use crate::plan::Action;

/// How long to wait for a new VM to reach RUNNING.
pub const INSTANCE_READY_TIMEOUT_SECS: u64 = 300;

const A_RECORD: &str = "A";

/// Values learned while reconciling, needed by later resources and reported
/// to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outputs {
    /// Email of the VM service account.
    pub service_account_email: Option<String>,
    /// The reserved external IP.
    pub external_ip: Option<String>,
    /// Last observed VM status.
    pub instance_status: Option<InstanceStatus>,
}

impl Outputs {
    fn record(&mut self, live: &Live) {
        match live {
            Live::ServiceAccount(account) => {
                self.service_account_email = Some(account.email.clone());
            }
            Live::StaticIp(address) => {
                if address.address.is_some() {
                    self.external_ip.clone_from(&address.address);
                }
            }
            Live::Instance(instance) => {
                self.instance_status = Some(instance.status.clone());
                if self.external_ip.is_none() {
                    self.external_ip.clone_from(&instance.public_ip);
                }
            }
            Live::Api | Live::Firewall(_) | Live::DnsRecord(_) => {}
        }
    }
}

/// Live state of one resource.
#[derive(Debug, Clone)]
pub(crate) enum Live {
    Api,
    ServiceAccount(ServiceAccount),
    Firewall(FirewallRule),
    StaticIp(StaticAddress),
    Instance(Box<Instance>),
    DnsRecord(DnsRecord),
}

/// Enablement of the APIs that serve resources, read at most once per run.
#[derive(Debug, Default)]
pub(crate) struct ApiGate {
    enabled: BTreeMap<String, bool>,
}

impl ApiGate {
    /// Record a state learned by observing the API itself.
    pub(crate) fn record(&mut self, service: &str, enabled: bool) {
        self.enabled.insert(service.to_string(), enabled);
    }

    /// Whether the API serving `resource` is enabled.
    pub(crate) async fn allows(
        &mut self,
        provider: &dyn CloudProvider,
        resource: &DesiredResource,
    ) -> Result<bool, CloudProviderError> {
        let Some(service) = resource.owning_api() else {
            return Ok(true);
        };
        if let Some(enabled) = self.enabled.get(service) {
            return Ok(*enabled);
        }

        let enabled = match provider.is_service_enabled(service).await {
            Ok(enabled) => enabled,
            Err(e) if e.is_service_disabled() => false,
            Err(e) => return Err(e),
        };
        if !enabled {
            debug!(service, "API disabled, nothing behind it can exist");
        }
        self.record(service, enabled);
        Ok(enabled)
    }
}

/// Read the live state of a resource. `None` when it does not exist.
pub(crate) async fn observe(
    provider: &dyn CloudProvider,
    resource: &DesiredResource,
    outputs: &mut Outputs,
) -> Result<Option<Live>, CloudProviderError> {
    let live = match resource {
        DesiredResource::Api { service } => provider
            .is_service_enabled(service)
            .await?
            .then_some(Live::Api),
        DesiredResource::ServiceAccount { account_id, .. } => provider
            .get_service_account(account_id)
            .await
            .found()?
            .map(Live::ServiceAccount),
        DesiredResource::Firewall(rule) => provider
            .get_firewall(&rule.name)
            .await
            .found()?
            .map(Live::Firewall),
        DesiredResource::StaticIp { name } => {
            provider.get_address(name).await.found()?.map(Live::StaticIp)
        }
        DesiredResource::Instance(spec) => provider
            .get_instance(&spec.name)
            .await
            .found()?
            .map(|instance| Live::Instance(Box::new(instance))),
        DesiredResource::DnsRecord { zone, name, .. } => provider
            .get_dns_record(zone, name, A_RECORD)
            .await
            .found()?
            .map(Live::DnsRecord),
    };

    if let Some(live) = &live {
        outputs.record(live);
    }
    Ok(live)
}

/// Read a resource that is about to be removed. Anything behind a disabled
/// API is absent.
pub(crate) async fn observe_existing(
    provider: &dyn CloudProvider,
    resource: &DesiredResource,
    gate: &mut ApiGate,
    outputs: &mut Outputs,
) -> Result<Option<Live>, CloudProviderError> {
    if !gate.allows(provider, resource).await? {
        return Ok(None);
    }
    match observe(provider, resource, outputs).await {
        Err(e) if e.is_service_disabled() => Ok(None),
        other => other,
    }
}

/// Create a resource. A create that loses a race to another writer counts
/// as success.
pub(crate) async fn create(
    provider: &dyn CloudProvider,
    resource: &DesiredResource,
    outputs: &mut Outputs,
) -> Result<()> {
    let id = resource.id();
    info!(resource = %id, "Creating");
    warn_if_open(resource);

    match create_resource(provider, resource, outputs).await {
        Ok(()) => {}
        Err(e) if e.is_already_exists() => {
            warn!(resource = %id, "Already exists, treating as created");
            observe(provider, resource, outputs)
                .await
                .with_context(|| format!("Failed to read {id}"))?;
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to create {id}")),
    }

    ensure_bindings(provider, resource, outputs).await
}

async fn create_resource(
    provider: &dyn CloudProvider,
    resource: &DesiredResource,
    outputs: &mut Outputs,
) -> Result<(), CloudProviderError> {
    match resource {
        DesiredResource::Api { service } => provider.enable_service(service).await,
        DesiredResource::ServiceAccount {
            account_id,
            display_name,
            ..
        } => {
            let account = provider
                .create_service_account(account_id, display_name)
                .await?;
            outputs.service_account_email = Some(account.email);
            Ok(())
        }
        DesiredResource::Firewall(rule) => provider.create_firewall(rule).await,
        DesiredResource::StaticIp { name } => {
            let address = provider.reserve_address(name).await?;
            outputs.external_ip = address.address;
            Ok(())
        }
        DesiredResource::Instance(spec) => create_instance(provider, spec, outputs).await,
        DesiredResource::DnsRecord { zone, name, ttl } => {
            create_dns_record(provider, zone, name, *ttl, outputs).await
        }
    }
}

async fn create_dns_record(
    provider: &dyn CloudProvider,
    zone: &str,
    name: &str,
    ttl: u32,
    outputs: &Outputs,
) -> Result<(), CloudProviderError> {
    let ip = outputs.external_ip.clone().ok_or_else(|| {
        CloudProviderError::Config(format!("no external IP known for record {name}"))
    })?;
    provider
        .create_dns_record(
            zone,
            &DnsRecord {
                name: name.to_string(),
                record_type: A_RECORD.to_string(),
                ttl,
                rrdatas: vec![ip],
            },
        )
        .await
}

fn warn_if_open(resource: &DesiredResource) {
    if let DesiredResource::Firewall(rule) = resource {
        if is_open_to_internet(rule) {
            warn!(
                rule = %rule.name,
                "Rule allows 0.0.0.0/0; restrict ALLOWED_SOURCE_RANGES before production use"
            );
        }
    }
}

async fn create_instance(
    provider: &dyn CloudProvider,
    spec: &InstanceSpec,
    outputs: &mut Outputs,
) -> Result<(), CloudProviderError> {
    let static_ip = match &outputs.external_ip {
        Some(ip) => Some(ip.clone()),
        None => provider
            .get_address(&spec.address_name)
            .await
            .found()?
            .and_then(|address| address.address),
    };
    let service_account = match &outputs.service_account_email {
        Some(email) => Some(email.clone()),
        None => provider
            .get_service_account(&spec.service_account_id)
            .await
            .found()?
            .map(|account| account.email),
    };

    provider
        .create_instance(CreateInstanceRequest {
            name: spec.name.clone(),
            instance_type: spec.machine_type.clone(),
            image: spec.image.clone(),
            disk_size_gb: spec.disk_size_gb,
            network: spec.network.clone(),
            static_ip,
            tags: spec.tags.clone(),
            service_account,
            startup_script: spec.startup_script.clone(),
            labels: spec.labels.clone(),
        })
        .await?;

    info!(instance = %spec.name, "Waiting for instance to start");
    let instance = provider
        .wait_instance_ready(&spec.name, INSTANCE_READY_TIMEOUT_SECS)
        .await?;
    outputs.record(&Live::Instance(Box::new(instance)));
    Ok(())
}

/// Converge the parts of an existing resource that are safe to re-apply.
/// Currently the service account's project roles.
pub(crate) async fn ensure_bindings(
    provider: &dyn CloudProvider,
    resource: &DesiredResource,
    outputs: &Outputs,
) -> Result<()> {
    if let DesiredResource::ServiceAccount { roles, .. } = resource {
        let Some(email) = &outputs.service_account_email else {
            bail!("service account email unknown, cannot grant roles");
        };
        let member = format!("serviceAccount:{email}");
        provider
            .grant_project_roles(&member, roles)
            .await
            .with_context(|| format!("Failed to grant roles to {member}"))?;
        debug!(member = %member, roles = roles.len(), "Project roles ensured");
    }
    Ok(())
}

/// Apply an in-place change. A record set is replaced, since the record
/// API has no update call.
pub(crate) async fn update(
    provider: &dyn CloudProvider,
    resource: &DesiredResource,
    outputs: &Outputs,
) -> Result<()> {
    let id = resource.id();
    info!(resource = %id, "Updating");
    warn_if_open(resource);

    let result = match resource {
        DesiredResource::Firewall(rule) => provider.update_firewall(rule).await,
        DesiredResource::DnsRecord { zone, name, ttl } => {
            match provider.delete_dns_record(zone, name, A_RECORD).await {
                Ok(()) => create_dns_record(provider, zone, name, *ttl, outputs).await,
                Err(e) => Err(e),
            }
        }
        DesiredResource::Instance(spec) => match &spec.startup_script {
            Some(script) => provider.update_startup_script(&spec.name, script).await,
            None => return Ok(()),
        },
        _ => bail!("{id} cannot be updated in place"),
    };
    result.with_context(|| format!("Failed to update {id}"))
}

/// Delete a resource. Absent resources are not an error. APIs are never
/// disabled.
pub(crate) async fn delete(
    provider: &dyn CloudProvider,
    resource: &DesiredResource,
) -> Result<(), CloudProviderError> {
    match resource {
        DesiredResource::Api { service } => {
            debug!(service = %service, "Leaving API enabled");
            Ok(())
        }
        DesiredResource::ServiceAccount { account_id, .. } => {
            provider.delete_service_account(account_id).await
        }
        DesiredResource::Firewall(rule) => provider.delete_firewall(&rule.name).await,
        DesiredResource::StaticIp { name } => provider.release_address(name).await,
        DesiredResource::Instance(spec) => provider.delete_instance(&spec.name).await,
        DesiredResource::DnsRecord { zone, name, .. } => {
            provider.delete_dns_record(zone, name, A_RECORD).await
        }
    }
}

/// Compare desired and live state.
pub(crate) fn diff(resource: &DesiredResource, live: &Live, outputs: &Outputs) -> Action {
    match (resource, live) {
        (DesiredResource::Firewall(desired), Live::Firewall(current)) => {
            let changes = desired.differences(current);
            if changes.is_empty() {
                Action::NoChange
            } else {
                Action::Update(changes)
            }
        }
        (DesiredResource::Instance(spec), Live::Instance(current)) => {
            diff_instance(spec, current, outputs)
        }
        (DesiredResource::DnsRecord { .. }, Live::DnsRecord(current)) => {
            match &outputs.external_ip {
                Some(ip) if current.rrdatas != [ip.clone()] => Action::Update(vec![format!(
                    "rrdatas: [{}] -> [{ip}]",
                    current.rrdatas.join(",")
                )]),
                _ => Action::NoChange,
            }
        }
        _ => Action::NoChange,
    }
}

fn diff_instance(spec: &InstanceSpec, current: &Instance, outputs: &Outputs) -> Action {
    let mut drift = Vec::new();

    if spec.machine_type != current.instance_type {
        drift.push(format!(
            "machine_type: {} -> {}",
            current.instance_type, spec.machine_type
        ));
    }

    let mut desired_tags = spec.tags.clone();
    desired_tags.sort();
    let mut live_tags = current.tags.clone();
    live_tags.sort();
    if desired_tags != live_tags {
        drift.push(format!(
            "tags: [{}] -> [{}]",
            live_tags.join(","),
            desired_tags.join(",")
        ));
    }

    if let (Some(want), Some(have)) = (&outputs.external_ip, &current.public_ip) {
        if want != have {
            drift.push(format!("external_ip: {have} -> {want}"));
        }
    }

    if let (Some(want), Some(have)) = (&outputs.service_account_email, &current.service_account) {
        if want != have {
            drift.push(format!("service_account: {have} -> {want}"));
        }
    }

    if !drift.is_empty() {
        return Action::Drift(drift);
    }

    match &spec.startup_script {
        Some(script) if current.startup_script() != Some(script.as_str()) => {
            Action::Update(vec!["startup_script".to_string()])
        }
        _ => Action::NoChange,
    }
}
