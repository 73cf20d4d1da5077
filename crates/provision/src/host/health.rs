//! Container health check: restart whatever is not running.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::runner::CommandRunner;
use super::{compose, HostError};
use crate::config::AppConfig;

/// One container as reported by `docker compose ps`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceState {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "Name", default)]
    pub container: String,
    /// e.g. `running`, `exited`, `restarting`.
    #[serde(rename = "State")]
    pub state: String,
}

impl ServiceState {
    /// Whether the container is up.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Parse `docker compose ps --format json`. Newer compose versions print
/// one object per line, older ones a single array.
///
/// # Errors
/// Returns [`HostError::Parse`] for anything else.
pub fn parse_ps(output: &str) -> Result<Vec<ServiceState>, HostError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| HostError::Parse(e.to_string()));
    }
    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| HostError::Parse(e.to_string())))
        .collect()
}

/// What a health check found and did.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub services: Vec<ServiceState>,
    /// Services started again.
    pub restarted: Vec<String>,
    /// No containers existed and the whole stack was started.
    pub started_stack: bool,
}

impl HealthReport {
    /// Everything was already running.
    #[must_use]
    pub fn healthy(&self) -> bool {
        !self.started_stack && self.restarted.is_empty()
    }
}

/// Checks and heals the application's containers.
pub struct HealthChecker {
    app: AppConfig,
    runner: Arc<dyn CommandRunner>,
}

impl HealthChecker {
    #[must_use]
    pub fn new(app: AppConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { app, runner }
    }

    /// Inspect containers and start any that are down.
    ///
    /// # Errors
    /// Returns an error if docker cannot be queried or a restart fails.
    pub fn run(&self) -> Result<HealthReport> {
        let runner = self.runner.as_ref();
        let output = runner
            .run_checked(&compose(&self.app, ["ps", "--all", "--format", "json"]))
            .context("Failed to list containers")?;
        let services = parse_ps(&output.stdout)?;

        let mut report = HealthReport {
            services,
            ..HealthReport::default()
        };

        if report.services.is_empty() {
            warn!(dir = %self.app.app_dir.display(), "No containers found, starting the stack");
            runner
                .run_checked(&compose(&self.app, ["up", "-d"]))
                .context("docker compose up failed")?;
            report.started_stack = true;
            return Ok(report);
        }

        let mut down: Vec<String> = report
            .services
            .iter()
            .filter(|s| !s.is_running())
            .map(|s| s.service.clone())
            .collect();
        down.sort();
        down.dedup();

        if down.is_empty() {
            info!(services = report.services.len(), "All containers running");
            return Ok(report);
        }

        warn!(services = %down.join(","), "Restarting stopped services");
        let mut args = vec!["up".to_string(), "-d".to_string()];
        args.extend(down.iter().cloned());
        runner
            .run_checked(&compose(&self.app, args))
            .context("Failed to restart services")?;
        report.restarted = down;
        Ok(report)
    }
}
