//! On-demand update: latest source, fresh images, recreated containers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::bootstrap::{sync_source, SourceSync};
use super::compose;
use super::runner::CommandRunner;
use crate::config::AppConfig;

/// What an update did.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub source: SourceSync,
}

/// Pulls and redeploys the application.
pub struct Updater {
    app: AppConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Updater {
    #[must_use]
    pub fn new(app: AppConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { app, runner }
    }

    /// Sync the source, pull images and recreate containers.
    ///
    /// # Errors
    /// Returns an error at the first failing step.
    pub fn run(&self) -> Result<UpdateReport> {
        let runner = self.runner.as_ref();
        let source = sync_source(runner, &self.app)?;

        runner
            .run_checked(&compose(&self.app, ["pull", "--ignore-pull-failures"]))
            .context("docker compose pull failed")?;
        runner
            .run_checked(&compose(
                &self.app,
                ["up", "-d", "--build", "--remove-orphans"],
            ))
            .context("docker compose up failed")?;

        info!(source = ?source, "Update complete");
        Ok(UpdateReport { source })
    }
}
