//! Deployment configuration.
//!
//! Values are resolved from three layers, lowest precedence first: built-in
//! defaults, an optional TOML file, and environment variables. Names of the
//! provisioned resources are derived from the instance name so that every
//! run targets the same resources.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hoist_cloud::gcp::images;

/// Default region.
pub const DEFAULT_REGION: &str = "us-central1";
/// Default zone.
pub const DEFAULT_ZONE: &str = "us-central1-a";
/// Default instance name.
pub const DEFAULT_INSTANCE_NAME: &str = "app-server";
/// Default machine type.
pub const DEFAULT_MACHINE_TYPE: &str = "e2-standard-4";
/// Default boot disk size in GB.
pub const DEFAULT_DISK_SIZE_GB: u32 = 50;
/// Default VPC network.
pub const DEFAULT_NETWORK: &str = "default";
/// Default branch to deploy.
pub const DEFAULT_BRANCH: &str = "main";
/// Default checkout directory on the VM.
pub const DEFAULT_APP_DIR: &str = "/opt/app";
/// Default compose file inside the checkout.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
/// Default model pulled by the model server.
pub const DEFAULT_MODEL_NAME: &str = "llama3.1:8b";
/// Source range that opens a rule to the internet.
pub const ANY_SOURCE: &str = "0.0.0.0/0";

/// Configuration errors. All of them abort before any provider call.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required value is not set anywhere.
    #[error("{key} is not set (export {key}=... or add it to the config file)")]
    Missing { key: &'static str },

    /// A value could not be used.
    #[error("invalid {key} '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The zone is not inside the region.
    #[error("zone '{zone}' is not in region '{region}'")]
    ZoneOutsideRegion { zone: String, region: String },

    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Optional file layer. Keys mirror the environment variables in snake case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub instance_name: Option<String>,
    pub machine_type: Option<String>,
    pub disk_size: Option<u32>,
    pub image: Option<String>,
    pub network: Option<String>,
    pub allowed_source_ranges: Option<Vec<String>>,
    pub dns_zone: Option<String>,
    pub domain: Option<String>,
    pub repo_url: Option<String>,
    pub repo_branch: Option<String>,
    pub app_dir: Option<PathBuf>,
    pub compose_file: Option<String>,
    pub model_name: Option<String>,
    pub public_host: Option<String>,
}

impl ConfigFile {
    /// Load a TOML config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// DNS record management, enabled when both zone and domain are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Cloud DNS managed zone name.
    pub zone: String,
    /// Domain pointed at the static IP.
    pub domain: String,
}

impl DnsConfig {
    /// Fully qualified record name (trailing dot).
    #[must_use]
    pub fn record_name(&self) -> String {
        if self.domain.ends_with('.') {
            self.domain.clone()
        } else {
            format!("{}.", self.domain)
        }
    }
}

/// Application settings. This is all the VM-side commands need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name used for add-on file names.
    pub name: String,
    /// Git repository to deploy.
    pub repo_url: Option<String>,
    /// Branch to deploy.
    pub repo_branch: String,
    /// Checkout directory.
    pub app_dir: PathBuf,
    /// Compose file relative to the checkout.
    pub compose_file: String,
    /// Model served by the model API.
    pub model_name: String,
    /// Public host written into the generated environment file.
    pub public_host: Option<String>,
}

impl AppConfig {
    /// Resolve application settings.
    ///
    /// # Errors
    /// Returns an error for invalid values.
    pub fn resolve(
        file: &ConfigFile,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let layers = Layers { env };
        let name = layers.string("INSTANCE_NAME", file.instance_name.as_ref(), DEFAULT_INSTANCE_NAME);
        validate_resource_name("INSTANCE_NAME", &name)?;

        let app_dir = layers
            .optional("APP_DIR", None)
            .map(PathBuf::from)
            .or_else(|| file.app_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_APP_DIR));
        if !app_dir.is_absolute() {
            return Err(ConfigError::Invalid {
                key: "APP_DIR",
                value: app_dir.display().to_string(),
                reason: "must be an absolute path".to_string(),
            });
        }

        Ok(Self {
            name,
            repo_url: layers.optional("REPO_URL", file.repo_url.as_ref()),
            repo_branch: layers.string("REPO_BRANCH", file.repo_branch.as_ref(), DEFAULT_BRANCH),
            app_dir,
            compose_file: layers.string(
                "COMPOSE_FILE",
                file.compose_file.as_ref(),
                DEFAULT_COMPOSE_FILE,
            ),
            model_name: layers.string("MODEL_NAME", file.model_name.as_ref(), DEFAULT_MODEL_NAME),
            public_host: layers.optional("PUBLIC_HOST", file.public_host.as_ref()),
        })
    }

    /// The repository URL, required for bootstrapping.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when unset.
    pub fn require_repo_url(&self) -> Result<&str, ConfigError> {
        self.repo_url
            .as_deref()
            .ok_or(ConfigError::Missing { key: "REPO_URL" })
    }

    /// Path of the generated environment file.
    #[must_use]
    pub fn env_file_path(&self) -> PathBuf {
        self.app_dir.join(".env")
    }
}

/// Full deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// GCP project id.
    pub project_id: String,
    /// Region for the static IP.
    pub region: String,
    /// Zone for the instance.
    pub zone: String,
    /// Instance name; every other resource name derives from it.
    pub instance_name: String,
    /// Machine type.
    pub machine_type: String,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Boot image.
    pub image: String,
    /// VPC network.
    pub network: String,
    /// Source ranges for every firewall rule.
    pub source_ranges: Vec<String>,
    /// Optional DNS record.
    pub dns: Option<DnsConfig>,
    /// Application settings.
    pub app: AppConfig,
}

impl DeployConfig {
    /// Resolve the full configuration.
    ///
    /// # Errors
    /// Returns an error if a required value is missing or a value is invalid.
    pub fn resolve(
        file: &ConfigFile,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let layers = Layers { env };

        let project_id = layers
            .optional("PROJECT_ID", file.project_id.as_ref())
            .ok_or(ConfigError::Missing { key: "PROJECT_ID" })?;

        let region = layers.string("REGION", file.region.as_ref(), DEFAULT_REGION);
        let zone = layers.string("ZONE", file.zone.as_ref(), DEFAULT_ZONE);
        if !zone.starts_with(&format!("{region}-")) {
            return Err(ConfigError::ZoneOutsideRegion { zone, region });
        }

        let disk_size_gb = match layers.optional("DISK_SIZE", None) {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "DISK_SIZE",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => file.disk_size.unwrap_or(DEFAULT_DISK_SIZE_GB),
        };
        if disk_size_gb < 10 {
            return Err(ConfigError::Invalid {
                key: "DISK_SIZE",
                value: disk_size_gb.to_string(),
                reason: "boot disks must be at least 10 GB".to_string(),
            });
        }

        let source_ranges = match layers.optional("ALLOWED_SOURCE_RANGES", None) {
            Some(raw) => split_list(&raw),
            None => file
                .allowed_source_ranges
                .clone()
                .unwrap_or_else(|| vec![ANY_SOURCE.to_string()]),
        };
        if source_ranges.is_empty() {
            return Err(ConfigError::Invalid {
                key: "ALLOWED_SOURCE_RANGES",
                value: String::new(),
                reason: "at least one CIDR range is required".to_string(),
            });
        }

        let dns = match (
            layers.optional("DNS_ZONE", file.dns_zone.as_ref()),
            layers.optional("DOMAIN", file.domain.as_ref()),
        ) {
            (Some(zone), Some(domain)) => Some(DnsConfig { zone, domain }),
            _ => None,
        };

        let app = AppConfig::resolve(file, env)?;
        let config = Self {
            project_id,
            region,
            zone,
            instance_name: app.name.clone(),
            machine_type: layers.string(
                "MACHINE_TYPE",
                file.machine_type.as_ref(),
                DEFAULT_MACHINE_TYPE,
            ),
            disk_size_gb,
            image: layers.string("IMAGE", file.image.as_ref(), images::UBUNTU_22_04),
            network: layers.string("NETWORK", file.network.as_ref(), DEFAULT_NETWORK),
            source_ranges,
            dns,
            app,
        };

        let account_id = config.service_account_id();
        if !(6..=30).contains(&account_id.len()) {
            return Err(ConfigError::Invalid {
                key: "INSTANCE_NAME",
                value: config.instance_name,
                reason: format!(
                    "derived service account id '{account_id}' must be 6-30 characters"
                ),
            });
        }

        Ok(config)
    }

    /// Reserved static IP name.
    #[must_use]
    pub fn address_name(&self) -> String {
        format!("{}-ip", self.instance_name)
    }

    /// Service account id.
    #[must_use]
    pub fn service_account_id(&self) -> String {
        format!("{}-sa", self.instance_name)
    }

    /// Network tag the firewall rules target.
    #[must_use]
    pub fn network_tag(&self) -> String {
        self.instance_name.clone()
    }

    /// Firewall rule name for a purpose, e.g. `app-server-allow-web`.
    #[must_use]
    pub fn firewall_rule_name(&self, purpose: &str) -> String {
        format!("{}-allow-{purpose}", self.instance_name)
    }

    /// Whether any rule is open to the whole internet.
    #[must_use]
    pub fn is_open_to_internet(&self) -> bool {
        self.source_ranges.iter().any(|r| r == ANY_SOURCE)
    }
}

/// Environment-over-file lookup.
struct Layers<'a> {
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl Layers<'_> {
    fn optional(&self, key: &str, file_value: Option<&String>) -> Option<String> {
        (self.env)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| file_value.cloned().filter(|v| !v.is_empty()))
    }

    fn string(&self, key: &str, file_value: Option<&String>, default: &str) -> String {
        self.optional(key, file_value)
            .unwrap_or_else(|| default.to_string())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Compute Engine resource names: lowercase RFC 1035 labels.
static RESOURCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").unwrap());

// 40 leaves room for the longest derived suffix ("-allow-model-api") within 63.
fn validate_resource_name(key: &'static str, name: &str) -> Result<(), ConfigError> {
    if name.len() > 40 || !RESOURCE_NAME.is_match(name) {
        return Err(ConfigError::Invalid {
            key,
            value: name.to_string(),
            reason: "use 1-40 lowercase letters, digits or hyphens, starting with a letter"
                .to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config =
            DeployConfig::resolve(&ConfigFile::default(), &env(&[("PROJECT_ID", "demo")])).unwrap();
        assert_eq!(config.project_id, "demo");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.zone, DEFAULT_ZONE);
        assert_eq!(config.instance_name, DEFAULT_INSTANCE_NAME);
        assert_eq!(config.machine_type, DEFAULT_MACHINE_TYPE);
        assert_eq!(config.disk_size_gb, DEFAULT_DISK_SIZE_GB);
        assert_eq!(config.source_ranges, vec![ANY_SOURCE]);
        assert!(config.dns.is_none());
        assert_eq!(config.address_name(), "app-server-ip");
        assert_eq!(config.service_account_id(), "app-server-sa");
    }

    #[test]
    fn test_missing_project_aborts() {
        let err = DeployConfig::resolve(&ConfigFile::default(), &env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "PROJECT_ID" }));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            project_id: Some("from-file".to_string()),
            machine_type: Some("e2-standard-2".to_string()),
            disk_size: Some(80),
            ..ConfigFile::default()
        };
        let config = DeployConfig::resolve(
            &file,
            &env(&[("PROJECT_ID", "from-env"), ("DISK_SIZE", "120")]),
        )
        .unwrap();
        assert_eq!(config.project_id, "from-env");
        assert_eq!(config.machine_type, "e2-standard-2");
        assert_eq!(config.disk_size_gb, 120);
    }

    #[test]
    fn test_zone_must_match_region() {
        let err = DeployConfig::resolve(
            &ConfigFile::default(),
            &env(&[("PROJECT_ID", "demo"), ("ZONE", "europe-west1-b")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZoneOutsideRegion { .. }));
    }

    #[test]
    fn test_invalid_disk_size() {
        let err = DeployConfig::resolve(
            &ConfigFile::default(),
            &env(&[("PROJECT_ID", "demo"), ("DISK_SIZE", "fifty")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DISK_SIZE", .. }));
    }

    #[test]
    fn test_instance_name_validation() {
        for bad in ["App", "1app", "app_server", "app-"] {
            let err = DeployConfig::resolve(
                &ConfigFile::default(),
                &env(&[("PROJECT_ID", "demo"), ("INSTANCE_NAME", bad)]),
            )
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: "INSTANCE_NAME", .. }), "{bad}");
        }
    }

    #[test]
    fn test_short_instance_name_rejected_by_account_length() {
        let err = DeployConfig::resolve(
            &ConfigFile::default(),
            &env(&[("PROJECT_ID", "demo"), ("INSTANCE_NAME", "ab")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "INSTANCE_NAME", .. }));
    }

    #[test]
    fn test_source_ranges_and_dns() {
        let config = DeployConfig::resolve(
            &ConfigFile::default(),
            &env(&[
                ("PROJECT_ID", "demo"),
                ("ALLOWED_SOURCE_RANGES", "203.0.113.0/24, 198.51.100.7/32"),
                ("DNS_ZONE", "example-zone"),
                ("DOMAIN", "app.example.com"),
            ]),
        )
        .unwrap();
        assert_eq!(config.source_ranges, vec!["203.0.113.0/24", "198.51.100.7/32"]);
        assert!(!config.is_open_to_internet());
        let dns = config.dns.unwrap();
        assert_eq!(dns.record_name(), "app.example.com.");
    }

    #[test]
    fn test_repo_url_required_for_bootstrap() {
        let app = AppConfig::resolve(&ConfigFile::default(), &env(&[])).unwrap();
        assert!(matches!(
            app.require_repo_url(),
            Err(ConfigError::Missing { key: "REPO_URL" })
        ));
        assert_eq!(app.env_file_path(), PathBuf::from("/opt/app/.env"));
    }

    #[test]
    fn test_config_file_parses() {
        let file: ConfigFile = toml::from_str(
            r#"
            project_id = "demo"
            zone = "us-central1-b"
            allowed_source_ranges = ["10.0.0.0/8"]
            repo_url = "https://github.com/acme/stack.git"
            "#,
        )
        .unwrap();
        let config = DeployConfig::resolve(&file, &env(&[])).unwrap();
        assert_eq!(config.zone, "us-central1-b");
        assert_eq!(config.source_ranges, vec!["10.0.0.0/8"]);
        assert_eq!(
            config.app.require_repo_url().unwrap(),
            "https://github.com/acme/stack.git"
        );
    }
}
