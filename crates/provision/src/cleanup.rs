//! Teardown of everything setup creates.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use hoist_cloud::CloudProvider;

use crate::blueprint::Blueprint;
use crate::config::DeployConfig;
use crate::reconcile::{self, ApiGate, Outputs};
use crate::resource::{ResourceId, ResourceKind};

/// Outcome of a teardown run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    /// Resources deleted by this run.
    pub deleted: Vec<ResourceId>,
    /// Resources that were already gone.
    pub absent: Vec<ResourceId>,
}

/// Deletes the deployment's resources: DNS record, VM, static IP, firewall
/// rules, then the service account. Enabled APIs are left alone since other
/// workloads in the project may rely on them.
pub struct Teardown {
    provider: Arc<dyn CloudProvider>,
    blueprint: Blueprint,
}

impl Teardown {
    /// Teardown for a configuration.
    #[must_use]
    pub fn new(provider: Arc<dyn CloudProvider>, config: &DeployConfig) -> Self {
        Self {
            provider,
            blueprint: Blueprint::from_config(config, None),
        }
    }

    /// Ids that would be targeted, in deletion order.
    #[must_use]
    pub fn targets(&self) -> Vec<ResourceId> {
        self.blueprint
            .ids()
            .into_iter()
            .rev()
            .filter(|id| id.kind != ResourceKind::Api)
            .collect()
    }

    /// Delete every resource that exists. Safe to run repeatedly, including
    /// on a project where the APIs were never enabled.
    ///
    /// # Errors
    /// Returns an error if a deletion fails; earlier deletions are kept.
    pub async fn run(&self) -> Result<TeardownReport> {
        let provider = self.provider.as_ref();
        let mut outputs = Outputs::default();
        let mut gate = ApiGate::default();
        let mut report = TeardownReport::default();

        for resource in self.blueprint.resources().iter().rev() {
            let id = resource.id();
            if id.kind == ResourceKind::Api {
                continue;
            }

            let exists = reconcile::observe_existing(provider, resource, &mut gate, &mut outputs)
                .await
                .with_context(|| format!("Failed to check {id}"))?
                .is_some();
            if !exists {
                info!(resource = %id, "Not found, skipping");
                report.absent.push(id);
                continue;
            }

            info!(resource = %id, "Deleting");
            reconcile::delete(provider, resource)
                .await
                .with_context(|| format!("Failed to delete {id}"))?;
            report.deleted.push(id);
        }

        info!(
            deleted = report.deleted.len(),
            absent = report.absent.len(),
            "Teardown complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use hoist_cloud::{CloudProviderError, MockCloudProvider};

    use super::*;
    use crate::config::ConfigFile;

    fn config() -> DeployConfig {
        DeployConfig::resolve(&ConfigFile::default(), &|key| match key {
            "PROJECT_ID" => Some("demo".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_apis_mean_nothing_to_delete() {
        let mut mock = MockCloudProvider::new();
        mock.expect_is_service_enabled()
            .times(2)
            .returning(|_| Ok(false));
        mock.expect_get_instance().never();
        mock.expect_get_firewall().never();
        mock.expect_get_service_account().never();

        let report = Teardown::new(Arc::new(mock), &config()).run().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.absent.len(), 9);
    }

    #[tokio::test]
    async fn test_service_disabled_read_counts_as_absent() {
        let mut mock = MockCloudProvider::new();
        mock.expect_is_service_enabled().returning(|_| Ok(true));
        mock.expect_get_instance().returning(|_| {
            Err(CloudProviderError::ServiceDisabled(
                "compute.googleapis.com SERVICE_DISABLED".to_string(),
            ))
        });
        mock.expect_get_address()
            .returning(|name| Err(CloudProviderError::NotFound(name.to_string())));
        mock.expect_get_firewall()
            .returning(|name| Err(CloudProviderError::NotFound(name.to_string())));
        mock.expect_get_service_account()
            .returning(|id| Err(CloudProviderError::NotFound(id.to_string())));

        let report = Teardown::new(Arc::new(mock), &config()).run().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.absent[0].kind, ResourceKind::Instance);
    }

    #[test]
    fn test_targets_in_reverse_dependency_order() {
        let config = DeployConfig::resolve(&ConfigFile::default(), &|key| match key {
            "PROJECT_ID" => Some("demo".to_string()),
            "DNS_ZONE" => Some("zone".to_string()),
            "DOMAIN" => Some("app.example.com".to_string()),
            _ => None,
        })
        .unwrap();
        let provider: Arc<dyn CloudProvider> = Arc::new(MockCloudProvider::new());
        let kinds: Vec<ResourceKind> = Teardown::new(provider, &config)
            .targets()
            .into_iter()
            .map(|id| id.kind)
            .collect();

        assert_eq!(kinds.first(), Some(&ResourceKind::DnsRecord));
        assert_eq!(kinds[1], ResourceKind::Instance);
        assert_eq!(kinds[2], ResourceKind::StaticIp);
        assert_eq!(kinds.last(), Some(&ResourceKind::ServiceAccount));
        assert!(!kinds.contains(&ResourceKind::Api));
    }
}
