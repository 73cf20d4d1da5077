//! In-memory cloud used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hoist_cloud::{
    AddressStatus, CloudProvider, CloudProviderError, CreateInstanceRequest, DnsRecord,
    FirewallRule, Instance, InstanceStatus, ServiceAccount, StaticAddress, STARTUP_SCRIPT_KEY,
};
use hoist_provision::blueprint::{COMPUTE_API, DNS_API, IAM_API};
use hoist_provision::config::{ConfigFile, DeployConfig};

pub const PROJECT: &str = "demo-project";

#[derive(Debug, Default)]
pub struct State {
    pub services: BTreeSet<String>,
    pub accounts: BTreeMap<String, ServiceAccount>,
    pub bindings: BTreeMap<String, BTreeSet<String>>,
    pub firewalls: BTreeMap<String, FirewallRule>,
    pub addresses: BTreeMap<String, StaticAddress>,
    pub instances: BTreeMap<String, Instance>,
    pub records: BTreeMap<(String, String), DnsRecord>,
    /// Every mutating call, in order, e.g. `create_firewall app-server-allow-ssh`.
    pub calls: Vec<String>,
    next_ip: u8,
}

impl State {
    /// Reads of a resource fail the way the real API does while its
    /// service is disabled.
    fn require(&self, service: &str) -> Result<(), CloudProviderError> {
        if self.services.contains(service) {
            Ok(())
        } else {
            Err(CloudProviderError::ServiceDisabled(format!(
                "{service} has not been used in project {PROJECT} or it is disabled (SERVICE_DISABLED)"
            )))
        }
    }

    pub fn mutations(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[derive(Debug, Default, Clone)]
pub struct FakeCloud {
    pub state: Arc<Mutex<State>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|s| {
            s.accounts.is_empty()
                && s.firewalls.is_empty()
                && s.addresses.is_empty()
                && s.instances.is_empty()
                && s.records.is_empty()
        })
    }
}

fn not_found(what: &str) -> CloudProviderError {
    CloudProviderError::NotFound(what.to_string())
}

fn exists(what: &str) -> CloudProviderError {
    CloudProviderError::AlreadyExists(what.to_string())
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn is_service_enabled(&self, service: &str) -> Result<bool, CloudProviderError> {
        Ok(self.with(|s| s.services.contains(service)))
    }

    async fn enable_service(&self, service: &str) -> Result<(), CloudProviderError> {
        self.with(|s| {
            s.calls.push(format!("enable_service {service}"));
            s.services.insert(service.to_string());
        });
        Ok(())
    }

    async fn get_service_account(
        &self,
        account_id: &str,
    ) -> Result<ServiceAccount, CloudProviderError> {
        self.with(|s| {
            s.require(IAM_API)?;
            s.accounts.get(account_id).cloned().ok_or_else(|| not_found(account_id))
        })
    }

    async fn create_service_account(
        &self,
        account_id: &str,
        display_name: &str,
    ) -> Result<ServiceAccount, CloudProviderError> {
        self.with(|s| {
            if s.accounts.contains_key(account_id) {
                return Err(exists(account_id));
            }
            s.calls.push(format!("create_service_account {account_id}"));
            let account = ServiceAccount {
                account_id: account_id.to_string(),
                email: format!("{account_id}@{PROJECT}.iam.gserviceaccount.com"),
                display_name: Some(display_name.to_string()),
            };
            s.accounts.insert(account_id.to_string(), account.clone());
            Ok(account)
        })
    }

    async fn delete_service_account(&self, account_id: &str) -> Result<(), CloudProviderError> {
        self.with(|s| {
            s.calls.push(format!("delete_service_account {account_id}"));
            s.accounts.remove(account_id);
        });
        Ok(())
    }

    async fn grant_project_roles(
        &self,
        member: &str,
        roles: &[String],
    ) -> Result<(), CloudProviderError> {
        self.with(|s| {
            let bound = s.bindings.entry(member.to_string()).or_default();
            let before = bound.len();
            bound.extend(roles.iter().cloned());
            if bound.len() != before {
                s.calls.push(format!("grant_project_roles {member}"));
            }
        });
        Ok(())
    }

    async fn get_firewall(&self, name: &str) -> Result<FirewallRule, CloudProviderError> {
        self.with(|s| {
            s.require(COMPUTE_API)?;
            s.firewalls.get(name).cloned().ok_or_else(|| not_found(name))
        })
    }

    async fn create_firewall(&self, rule: &FirewallRule) -> Result<(), CloudProviderError> {
        self.with(|s| {
            if s.firewalls.contains_key(&rule.name) {
                return Err(exists(&rule.name));
            }
            s.calls.push(format!("create_firewall {}", rule.name));
            s.firewalls.insert(rule.name.clone(), rule.clone());
            Ok(())
        })
    }

    async fn update_firewall(&self, rule: &FirewallRule) -> Result<(), CloudProviderError> {
        self.with(|s| {
            if !s.firewalls.contains_key(&rule.name) {
                return Err(not_found(&rule.name));
            }
            s.calls.push(format!("update_firewall {}", rule.name));
            s.firewalls.insert(rule.name.clone(), rule.clone());
            Ok(())
        })
    }

    async fn delete_firewall(&self, name: &str) -> Result<(), CloudProviderError> {
        self.with(|s| {
            s.calls.push(format!("delete_firewall {name}"));
            s.firewalls.remove(name);
        });
        Ok(())
    }

    async fn get_address(&self, name: &str) -> Result<StaticAddress, CloudProviderError> {
        self.with(|s| {
            s.require(COMPUTE_API)?;
            s.addresses.get(name).cloned().ok_or_else(|| not_found(name))
        })
    }

    async fn reserve_address(&self, name: &str) -> Result<StaticAddress, CloudProviderError> {
        self.with(|s| {
            if s.addresses.contains_key(name) {
                return Err(exists(name));
            }
            s.calls.push(format!("reserve_address {name}"));
            s.next_ip += 1;
            let address = StaticAddress {
                name: name.to_string(),
                region: "us-central1".to_string(),
                address: Some(format!("34.10.20.{}", s.next_ip)),
                status: AddressStatus::Reserved,
            };
            s.addresses.insert(name.to_string(), address.clone());
            Ok(address)
        })
    }

    async fn release_address(&self, name: &str) -> Result<(), CloudProviderError> {
        self.with(|s| {
            s.calls.push(format!("release_address {name}"));
            s.addresses.remove(name);
        });
        Ok(())
    }

    async fn get_instance(&self, name: &str) -> Result<Instance, CloudProviderError> {
        self.with(|s| {
            s.require(COMPUTE_API)?;
            s.instances.get(name).cloned().ok_or_else(|| not_found(name))
        })
    }

    async fn create_instance(
        &self,
        req: CreateInstanceRequest,
    ) -> Result<Instance, CloudProviderError> {
        self.with(|s| {
            if s.instances.contains_key(&req.name) {
                return Err(exists(&req.name));
            }
            s.calls.push(format!("create_instance {}", req.name));

            let mut metadata = BTreeMap::new();
            if let Some(script) = &req.startup_script {
                metadata.insert(STARTUP_SCRIPT_KEY.to_string(), script.clone());
            }
            if let Some(ip) = &req.static_ip {
                for address in s.addresses.values_mut() {
                    if address.address.as_ref() == Some(ip) {
                        address.status = AddressStatus::InUse;
                    }
                }
            }

            let instance = Instance {
                id: format!("{}", s.instances.len() + 1),
                name: req.name.clone(),
                status: InstanceStatus::Pending,
                instance_type: req.instance_type.clone(),
                zone: "us-central1-a".to_string(),
                public_ip: req.static_ip.clone(),
                private_ip: Some("10.128.0.2".to_string()),
                tags: req.tags.clone(),
                service_account: req.service_account.clone(),
                metadata,
                created_at: None,
            };
            s.instances.insert(req.name.clone(), instance.clone());
            Ok(instance)
        })
    }

    async fn update_startup_script(
        &self,
        name: &str,
        script: &str,
    ) -> Result<(), CloudProviderError> {
        self.with(|s| {
            let instance = s.instances.get_mut(name).ok_or_else(|| not_found(name))?;
            instance
                .metadata
                .insert(STARTUP_SCRIPT_KEY.to_string(), script.to_string());
            s.calls.push(format!("update_startup_script {name}"));
            Ok(())
        })
    }

    async fn wait_instance_ready(
        &self,
        name: &str,
        _timeout_secs: u64,
    ) -> Result<Instance, CloudProviderError> {
        self.with(|s| {
            let instance = s.instances.get_mut(name).ok_or_else(|| not_found(name))?;
            instance.status = InstanceStatus::Running;
            Ok(instance.clone())
        })
    }

    async fn delete_instance(&self, name: &str) -> Result<(), CloudProviderError> {
        self.with(|s| {
            s.calls.push(format!("delete_instance {name}"));
            s.instances.remove(name);
        });
        Ok(())
    }

    async fn get_dns_record(
        &self,
        zone: &str,
        name: &str,
        _record_type: &str,
    ) -> Result<DnsRecord, CloudProviderError> {
        self.with(|s| {
            s.require(DNS_API)?;
            s.records
                .get(&(zone.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| not_found(name))
        })
    }

    async fn create_dns_record(
        &self,
        zone: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudProviderError> {
        self.with(|s| {
            let key = (zone.to_string(), record.name.clone());
            if s.records.contains_key(&key) {
                return Err(exists(&record.name));
            }
            s.calls.push(format!("create_dns_record {}", record.name));
            s.records.insert(key, record.clone());
            Ok(())
        })
    }

    async fn delete_dns_record(
        &self,
        zone: &str,
        name: &str,
        _record_type: &str,
    ) -> Result<(), CloudProviderError> {
        self.with(|s| {
            s.calls.push(format!("delete_dns_record {name}"));
            s.records.remove(&(zone.to_string(), name.to_string()));
        });
        Ok(())
    }
}

/// Configuration with a repository and optional extra variables.
pub fn config(extra: &[(&str, &str)]) -> DeployConfig {
    let vars: BTreeMap<String, String> = [("PROJECT_ID", PROJECT), ("REPO_URL", "https://github.com/acme/stack.git")]
        .iter()
        .chain(extra.iter())
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    DeployConfig::resolve(&ConfigFile::default(), &move |key| vars.get(key).cloned()).unwrap()
}
