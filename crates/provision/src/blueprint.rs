//! Desired state of a deployment.
//!
//! A [`Blueprint`] is the ordered list of resources a configuration calls
//! for. Order matters: later resources reference earlier ones (the VM needs
//! the address and the service account, the DNS record needs the address).

use std::collections::BTreeMap;

use hoist_cloud::FirewallRule;

use crate::config::DeployConfig;
use crate::firewall::firewall_rules;
use crate::resource::{ResourceId, ResourceKind};

/// Compute Engine: firewall rules, addresses and the VM.
pub const COMPUTE_API: &str = "compute.googleapis.com";

/// IAM: the service account.
pub const IAM_API: &str = "iam.googleapis.com";

/// APIs every deployment needs.
pub const REQUIRED_APIS: [&str; 3] = [
    COMPUTE_API,
    IAM_API,
    "cloudresourcemanager.googleapis.com",
];

/// API needed when a DNS record is managed.
pub const DNS_API: &str = "dns.googleapis.com";

/// Project roles granted to the VM service account.
pub const SERVICE_ACCOUNT_ROLES: [&str; 2] =
    ["roles/logging.logWriter", "roles/monitoring.metricWriter"];

/// TTL of the managed A record.
pub const DNS_TTL_SECS: u32 = 300;

/// The VM as it should be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub machine_type: String,
    pub image: String,
    pub disk_size_gb: u32,
    pub network: String,
    pub tags: Vec<String>,
    /// Name of the static address to attach.
    pub address_name: String,
    /// Account id of the service account to run as.
    pub service_account_id: String,
    /// `None` skips script management (teardown only needs names).
    pub startup_script: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// One desired resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredResource {
    /// An enabled API.
    Api { service: String },
    /// The VM service account and its project roles.
    ServiceAccount {
        account_id: String,
        display_name: String,
        roles: Vec<String>,
    },
    /// An ingress firewall rule.
    Firewall(FirewallRule),
    /// A regional static address.
    StaticIp { name: String },
    /// The VM.
    Instance(Box<InstanceSpec>),
    /// An A record pointing at the static address.
    DnsRecord {
        zone: String,
        name: String,
        ttl: u32,
    },
}

impl DesiredResource {
    /// Identity of the resource.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        match self {
            Self::Api { service } => ResourceId::new(ResourceKind::Api, service),
            Self::ServiceAccount { account_id, .. } => {
                ResourceId::new(ResourceKind::ServiceAccount, account_id)
            }
            Self::Firewall(rule) => ResourceId::new(ResourceKind::FirewallRule, &rule.name),
            Self::StaticIp { name } => ResourceId::new(ResourceKind::StaticIp, name),
            Self::Instance(spec) => ResourceId::new(ResourceKind::Instance, &spec.name),
            Self::DnsRecord { name, .. } => ResourceId::new(ResourceKind::DnsRecord, name),
        }
    }

    /// API that serves the resource. While it is disabled the resource
    /// cannot exist and reads of it are rejected.
    #[must_use]
    pub fn owning_api(&self) -> Option<&'static str> {
        match self {
            Self::Api { .. } => None,
            Self::ServiceAccount { .. } => Some(IAM_API),
            Self::Firewall(_) | Self::StaticIp { .. } | Self::Instance(_) => Some(COMPUTE_API),
            Self::DnsRecord { .. } => Some(DNS_API),
        }
    }
}

/// Ordered desired resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    resources: Vec<DesiredResource>,
}

impl Blueprint {
    /// Build the blueprint for a configuration.
    ///
    /// Pass the rendered startup script to manage it, or `None` when only
    /// resource names matter.
    #[must_use]
    pub fn from_config(config: &DeployConfig, startup_script: Option<String>) -> Self {
        let mut resources: Vec<DesiredResource> = REQUIRED_APIS
            .iter()
            .map(|service| DesiredResource::Api {
                service: (*service).to_string(),
            })
            .collect();
        if config.dns.is_some() {
            resources.push(DesiredResource::Api {
                service: DNS_API.to_string(),
            });
        }

        resources.push(DesiredResource::ServiceAccount {
            account_id: config.service_account_id(),
            display_name: format!("{} runtime", config.instance_name),
            roles: SERVICE_ACCOUNT_ROLES.iter().map(ToString::to_string).collect(),
        });

        resources.extend(firewall_rules(config).into_iter().map(DesiredResource::Firewall));

        resources.push(DesiredResource::StaticIp {
            name: config.address_name(),
        });

        resources.push(DesiredResource::Instance(Box::new(InstanceSpec {
            name: config.instance_name.clone(),
            machine_type: config.machine_type.clone(),
            image: config.image.clone(),
            disk_size_gb: config.disk_size_gb,
            network: config.network.clone(),
            tags: vec![config.network_tag()],
            address_name: config.address_name(),
            service_account_id: config.service_account_id(),
            startup_script,
            labels: BTreeMap::from([("managed-by".to_string(), "hoist".to_string())]),
        })));

        if let Some(dns) = &config.dns {
            resources.push(DesiredResource::DnsRecord {
                zone: dns.zone.clone(),
                name: dns.record_name(),
                ttl: DNS_TTL_SECS,
            });
        }

        Self { resources }
    }

    /// Resources in creation order.
    #[must_use]
    pub fn resources(&self) -> &[DesiredResource] {
        &self.resources
    }

    /// Look a resource up by id.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&DesiredResource> {
        self.resources.iter().find(|r| &r.id() == id)
    }

    /// Ids in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(DesiredResource::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    fn config(dns: bool) -> DeployConfig {
        DeployConfig::resolve(&ConfigFile::default(), &|key| match key {
            "PROJECT_ID" => Some("demo".to_string()),
            "DNS_ZONE" if dns => Some("example-zone".to_string()),
            "DOMAIN" if dns => Some("app.example.com".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_resource_order() {
        let blueprint = Blueprint::from_config(&config(false), None);
        let kinds: Vec<ResourceKind> = blueprint.ids().into_iter().map(|id| id.kind).collect();

        assert_eq!(&kinds[..3], &[ResourceKind::Api; 3]);
        assert_eq!(kinds[3], ResourceKind::ServiceAccount);
        assert!(kinds[4..10].iter().all(|k| *k == ResourceKind::FirewallRule));
        assert_eq!(kinds[10], ResourceKind::StaticIp);
        assert_eq!(kinds[11], ResourceKind::Instance);
        assert_eq!(kinds.len(), 12);
    }

    #[test]
    fn test_dns_adds_api_and_record() {
        let blueprint = Blueprint::from_config(&config(true), None);
        let ids = blueprint.ids();

        assert!(ids.contains(&ResourceId::new(ResourceKind::Api, DNS_API)));
        let last = ids.last().unwrap();
        assert_eq!(last.kind, ResourceKind::DnsRecord);
        assert_eq!(last.name, "app.example.com.");
    }

    #[test]
    fn test_owning_apis_are_in_blueprint() {
        let blueprint = Blueprint::from_config(&config(true), None);
        let enabled: Vec<&str> = blueprint
            .resources()
            .iter()
            .filter_map(|r| match r {
                DesiredResource::Api { service } => Some(service.as_str()),
                _ => None,
            })
            .collect();

        for resource in blueprint.resources() {
            match resource.owning_api() {
                Some(api) => assert!(enabled.contains(&api), "{} needs {api}", resource.id()),
                None => assert_eq!(resource.id().kind, ResourceKind::Api),
            }
        }
    }

    #[test]
    fn test_instance_references_derived_names() {
        let blueprint = Blueprint::from_config(&config(false), Some("#!/bin/bash".to_string()));
        let id = ResourceId::new(ResourceKind::Instance, "app-server");
        let Some(DesiredResource::Instance(spec)) = blueprint.get(&id) else {
            panic!("instance missing");
        };
        assert_eq!(spec.address_name, "app-server-ip");
        assert_eq!(spec.service_account_id, "app-server-sa");
        assert_eq!(spec.tags, vec!["app-server"]);
        assert_eq!(spec.startup_script.as_deref(), Some("#!/bin/bash"));
    }
}
