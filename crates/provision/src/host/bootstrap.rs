//! Native bootstrap, equivalent to the startup script.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::runner::{CommandRunner, CommandSpec};
use super::{compose, HostError};
use crate::config::AppConfig;
use crate::env_file::{EnvFile, Secrets, WriteOutcome};
use crate::scripts::{docker_daemon_config, paths, AddonFile, ScriptRenderer};

const DOCKER_INSTALL: &str = "curl -fsSL https://get.docker.com | sh";

/// How the source tree was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSync {
    /// Fresh clone.
    Cloned,
    /// Existing checkout fetched and reset to the remote branch.
    Updated,
}

/// Clone the repository, or hard-reset an existing checkout to the remote
/// branch. Local changes to tracked files are discarded.
///
/// # Errors
/// Returns an error if `REPO_URL` is unset or a git command fails.
pub fn sync_source(runner: &dyn CommandRunner, app: &AppConfig) -> Result<SourceSync> {
    let branch = &app.repo_branch;

    if app.app_dir.join(".git").is_dir() {
        info!(dir = %app.app_dir.display(), branch = %branch, "Updating checkout");
        runner
            .run_checked(
                &CommandSpec::new("git", ["fetch", "--prune", "origin", branch.as_str()])
                    .in_dir(&app.app_dir),
            )
            .context("git fetch failed")?;
        let remote = format!("origin/{branch}");
        runner
            .run_checked(
                &CommandSpec::new("git", ["reset", "--hard", remote.as_str()]).in_dir(&app.app_dir),
            )
            .context("git reset failed")?;
        return Ok(SourceSync::Updated);
    }

    let repo_url = app.require_repo_url()?;
    if let Some(parent) = app.app_dir.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(repo = %repo_url, dir = %app.app_dir.display(), branch = %branch, "Cloning");
    runner
        .run_checked(&CommandSpec::new(
            "git",
            [
                "clone".to_string(),
                "--branch".to_string(),
                branch.clone(),
                repo_url.to_string(),
                app.app_dir.display().to_string(),
            ],
        ))
        .context("git clone failed")?;
    Ok(SourceSync::Cloned)
}

/// What a bootstrap run did.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    /// Docker was installed by this run.
    pub runtime_installed: bool,
    pub source: SourceSync,
    pub env_file: WriteOutcome,
    /// Add-on files written.
    pub addons: Vec<PathBuf>,
}

/// Brings a host from bare OS to running containers.
pub struct Bootstrapper {
    app: AppConfig,
    runner: Arc<dyn CommandRunner>,
    system_root: PathBuf,
}

impl Bootstrapper {
    /// Bootstrapper writing system files under `/`.
    #[must_use]
    pub fn new(app: AppConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            app,
            runner,
            system_root: PathBuf::from("/"),
        }
    }

    /// Write system files (add-ons, docker daemon config) under `root`
    /// instead of `/`.
    #[must_use]
    pub fn with_system_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.system_root = root.into();
        self
    }

    /// Run every bootstrap step in order.
    ///
    /// # Errors
    /// Returns an error at the first failing step.
    pub fn run(&self) -> Result<BootstrapReport> {
        let runner = self.runner.as_ref();

        let runtime_installed = self.ensure_runtime()?;
        let source = sync_source(runner, &self.app)?;

        let public_host = self.app.public_host.as_deref().unwrap_or("localhost");
        let env_file = EnvFile::defaults(public_host, &self.app.model_name, &Secrets::generate())
            .write_if_absent(&self.app.env_file_path())?;

        info!(dir = %self.app.app_dir.display(), "Starting containers");
        runner
            .run_checked(&compose(&self.app, ["up", "-d", "--build"]))
            .context("docker compose up failed")?;

        let model = self.app.model_name.as_str();
        let pull = compose(&self.app, ["exec", "-T", "ollama", "ollama", "pull", model]);
        match runner.run_checked(&pull) {
            Ok(_) => info!(model, "Model pulled"),
            Err(e) => warn!(model, error = %e, "Model pull skipped"),
        }

        let addons = ScriptRenderer::new()?.addons(&self.app)?;
        let mut installed = Vec::with_capacity(addons.len());
        for addon in &addons {
            installed.push(self.install(addon)?);
        }

        info!(
            runtime_installed,
            source = ?source,
            env_file = ?env_file,
            addons = installed.len(),
            "Bootstrap complete"
        );
        Ok(BootstrapReport {
            runtime_installed,
            source,
            env_file,
            addons: installed,
        })
    }

    fn ensure_runtime(&self) -> Result<bool> {
        let runner = self.runner.as_ref();
        let mut installed = false;

        if !runner.is_installed("docker") {
            info!("Docker not found, installing");
            runner
                .run_checked(&CommandSpec::new("sh", ["-c", DOCKER_INSTALL]))
                .context("Docker installation failed")?;
            installed = true;
        }

        if !runner.is_installed("git") {
            info!("git not found, installing");
            runner
                .run_checked(&CommandSpec::new("apt-get", ["update", "-y"]))
                .context("apt-get update failed")?;
            runner
                .run_checked(&CommandSpec::new("apt-get", ["install", "-y", "git"]))
                .context("git installation failed")?;
        }

        if self.write_new(&paths::docker_daemon(), &docker_daemon_config())? {
            runner
                .run_checked(&CommandSpec::new("systemctl", ["restart", "docker"]))
                .context("Failed to restart docker")?;
        }

        Ok(installed)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.system_root
            .join(path.strip_prefix("/").unwrap_or(path))
    }

    /// Create a file only if absent. Returns whether it was written.
    fn write_new(&self, path: &Path, contents: &str) -> Result<bool, HostError> {
        let target = self.resolve(path);
        let io_err = |source| HostError::Io {
            path: target.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(mut file) => {
                file.write_all(contents.as_bytes()).map_err(io_err)?;
                file.write_all(b"\n").map_err(io_err)?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_err(e)),
        }
    }

    fn install(&self, addon: &AddonFile) -> Result<PathBuf, HostError> {
        let target = self.resolve(&addon.path);
        let io_err = |source| HostError::Io {
            path: target.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&target, &addon.contents).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(addon.mode))
                .map_err(io_err)?;
        }

        info!(path = %addon.path.display(), "Installed add-on");
        Ok(target)
    }
}
