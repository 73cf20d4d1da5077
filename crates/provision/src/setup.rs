//! Imperative provisioning: walk the blueprint once, creating whatever is
//! missing and leaving existing resources alone.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use hoist_cloud::CloudProvider;

use crate::blueprint::Blueprint;
use crate::config::DeployConfig;
use crate::reconcile::{self, Outputs};
use crate::resource::ResourceId;
use crate::scripts::ScriptRenderer;

/// Outcome of a setup run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupReport {
    /// Resources created by this run.
    pub created: Vec<ResourceId>,
    /// Resources that already existed and were skipped.
    pub existing: Vec<ResourceId>,
    /// Reserved external IP.
    pub external_ip: Option<String>,
    /// Everything learned while provisioning.
    pub outputs: Outputs,
}

/// Creates the deployment's resources in dependency order.
pub struct Provisioner {
    provider: Arc<dyn CloudProvider>,
    blueprint: Blueprint,
    open_to_internet: bool,
}

impl Provisioner {
    /// Provisioner for an explicit blueprint.
    #[must_use]
    pub fn new(provider: Arc<dyn CloudProvider>, blueprint: Blueprint) -> Self {
        Self {
            provider,
            blueprint,
            open_to_internet: false,
        }
    }

    /// Provisioner for a configuration, with the startup script rendered
    /// from it.
    ///
    /// # Errors
    /// Returns an error if the startup script cannot be rendered.
    pub fn for_config(provider: Arc<dyn CloudProvider>, config: &DeployConfig) -> Result<Self> {
        let script = ScriptRenderer::new()?
            .startup_script(config)
            .context("Failed to render startup script")?;
        let mut provisioner = Self::new(provider, Blueprint::from_config(config, Some(script)));
        provisioner.open_to_internet = config.is_open_to_internet();
        Ok(provisioner)
    }

    /// Run setup. Fails fast: the first error aborts the run and later
    /// resources are not attempted. Re-running resumes where it stopped.
    ///
    /// # Errors
    /// Returns an error if a resource cannot be read or created.
    pub async fn run(&self) -> Result<SetupReport> {
        if self.open_to_internet {
            warn!("Firewall rules allow 0.0.0.0/0; restrict ALLOWED_SOURCE_RANGES before production use");
        }

        let provider = self.provider.as_ref();
        let mut report = SetupReport::default();

        for resource in self.blueprint.resources() {
            let id = resource.id();
            let live = reconcile::observe(provider, resource, &mut report.outputs)
                .await
                .with_context(|| format!("Failed to check {id}"))?;

            if live.is_some() {
                warn!(resource = %id, "Already exists, skipping");
                reconcile::ensure_bindings(provider, resource, &report.outputs).await?;
                report.existing.push(id);
            } else {
                reconcile::create(provider, resource, &mut report.outputs).await?;
                info!(resource = %id, "Created");
                report.created.push(id);
            }
        }

        report.external_ip.clone_from(&report.outputs.external_ip);
        info!(
            created = report.created.len(),
            existing = report.existing.len(),
            external_ip = report.external_ip.as_deref().unwrap_or("unknown"),
            "Setup complete"
        );
        Ok(report)
    }
}
