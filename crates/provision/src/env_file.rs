//! The application's default environment file.
//!
//! The file is written once. When it already exists it is never opened for
//! writing, so operator edits and generated secrets survive every re-run.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::firewall::ports;

/// Database user.
pub const DB_USER: &str = "app";
/// Database name.
pub const DB_NAME: &str = "app";

/// Secret values written into the file.
#[derive(Debug, Clone)]
pub struct Secrets {
    /// Database password.
    pub postgres_password: String,
    /// Application signing key.
    pub secret_key: String,
}

impl Secrets {
    /// Fresh random secrets.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            postgres_password: uuid::Uuid::new_v4().simple().to_string(),
            secret_key: format!(
                "{}{}",
                uuid::Uuid::new_v4().simple(),
                uuid::Uuid::new_v4().simple()
            ),
        }
    }

    /// Shell variable references, for files generated by the startup script.
    /// The script assigns `POSTGRES_PASSWORD` and `SECRET_KEY` itself.
    #[must_use]
    pub fn shell_references() -> Self {
        Self {
            postgres_password: "${POSTGRES_PASSWORD}".to_string(),
            secret_key: "${SECRET_KEY}".to_string(),
        }
    }
}

/// Ordered `KEY=value` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

/// What [`EnvFile::write_if_absent`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was created.
    Created,
    /// The file existed and was left untouched.
    Preserved,
}

impl EnvFile {
    /// The default file for a deployment reachable at `public_host`.
    #[must_use]
    pub fn defaults(public_host: &str, model_name: &str, secrets: &Secrets) -> Self {
        let entries = [
            ("POSTGRES_USER", DB_USER.to_string()),
            ("POSTGRES_PASSWORD", secrets.postgres_password.clone()),
            ("POSTGRES_DB", DB_NAME.to_string()),
            (
                "DATABASE_URL",
                format!(
                    "postgresql://{DB_USER}:{}@db:{}/{DB_NAME}",
                    secrets.postgres_password,
                    ports::POSTGRES
                ),
            ),
            ("MODEL_NAME", model_name.to_string()),
            ("OLLAMA_BASE_URL", format!("http://ollama:{}", ports::OLLAMA)),
            ("BACKEND_URL", format!("http://{public_host}:{}", ports::BACKEND)),
            ("FRONTEND_URL", format!("http://{public_host}:{}", ports::FRONTEND)),
            ("SECRET_KEY", secrets.secret_key.clone()),
            ("BACKEND_PORT", ports::BACKEND.to_string()),
            ("FRONTEND_PORT", ports::FRONTEND.to_string()),
            ("DB_PORT", ports::POSTGRES.to_string()),
            ("OLLAMA_PORT", ports::OLLAMA.to_string()),
        ];

        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// File contents, one `KEY=value` per line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("# Generated on first boot. Edit freely; it is never overwritten.\n");
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Write the file unless it already exists.
    ///
    /// Creation is atomic with respect to existence (`create_new`), and the
    /// file is only readable by its owner.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn write_if_absent(&self, path: &Path) -> Result<WriteOutcome> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = match options.open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(path = %path.display(), "Environment file exists, leaving it untouched");
                return Ok(WriteOutcome::Preserved);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()));
            }
        };

        file.write_all(self.render().as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(path = %path.display(), keys = self.entries.len(), "Environment file written");
        Ok(WriteOutcome::Created)
    }
}
