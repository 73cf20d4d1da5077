//! Commands that run on the VM itself: bootstrap, health check and update.

pub mod bootstrap;
pub mod health;
pub mod runner;
pub mod update;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::AppConfig;

pub use bootstrap::{sync_source, BootstrapReport, Bootstrapper, SourceSync};
pub use health::{HealthChecker, HealthReport, ServiceState};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use update::{UpdateReport, Updater};

/// Host-side failures.
#[derive(Error, Debug)]
pub enum HostError {
    /// The program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", exit_status(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A file could not be written.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `docker compose ps` output could not be parsed.
    #[error("unexpected compose output: {0}")]
    Parse(String),
}

fn exit_status(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

/// `docker compose -f <file> <args>` run from the checkout.
pub(crate) fn compose<I, S>(app: &AppConfig, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut argv: Vec<String> = vec![
        "compose".to_string(),
        "-f".to_string(),
        app.compose_file.clone(),
    ];
    argv.extend(args.into_iter().map(Into::into));
    CommandSpec::new("docker", argv).in_dir(&app.app_dir)
}
