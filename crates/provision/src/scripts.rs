//! Rendered shell artifacts: the VM startup script and the operational
//! add-ons it installs (health check, cron entry, logrotate config, update
//! script).
//!
//! The startup script is deterministic for a given configuration. Secrets
//! are generated on the VM when the environment file is first written, so
//! re-rendering never produces a metadata diff.

use std::path::PathBuf;

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;

use crate::config::{AppConfig, DeployConfig};
use crate::env_file::{EnvFile, Secrets};

const STARTUP_TEMPLATE: &str = include_str!("../templates/startup.sh.hbs");
const HEALTHCHECK_TEMPLATE: &str = include_str!("../templates/healthcheck.sh.hbs");
const UPDATE_TEMPLATE: &str = include_str!("../templates/update.sh.hbs");
const LOGROTATE_TEMPLATE: &str = include_str!("../templates/logrotate.conf.hbs");
const CRON_TEMPLATE: &str = include_str!("../templates/healthcheck.cron.hbs");

/// Install locations of the add-ons, relative to the filesystem root.
pub mod paths {
    use std::path::PathBuf;

    /// Health-check script.
    #[must_use]
    pub fn healthcheck(app_name: &str) -> PathBuf {
        PathBuf::from(format!("/usr/local/bin/{app_name}-healthcheck"))
    }

    /// Update script.
    #[must_use]
    pub fn update(app_name: &str) -> PathBuf {
        PathBuf::from(format!("/usr/local/bin/{app_name}-update"))
    }

    /// Cron entry running the health check.
    #[must_use]
    pub fn cron(app_name: &str) -> PathBuf {
        PathBuf::from(format!("/etc/cron.d/{app_name}-healthcheck"))
    }

    /// Logrotate config.
    #[must_use]
    pub fn logrotate(app_name: &str) -> PathBuf {
        PathBuf::from(format!("/etc/logrotate.d/{app_name}"))
    }

    /// Docker daemon config.
    #[must_use]
    pub fn docker_daemon() -> PathBuf {
        PathBuf::from("/etc/docker/daemon.json")
    }
}

/// Docker daemon settings capping container log size.
#[must_use]
pub fn docker_daemon_config() -> String {
    let config = serde_json::json!({
        "log-driver": "json-file",
        "log-opts": { "max-size": "10m", "max-file": "3" }
    });
    serde_json::to_string_pretty(&config).unwrap_or_default()
}

/// A rendered file and where it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonFile {
    /// Absolute install path.
    pub path: PathBuf,
    /// Contents.
    pub contents: String,
    /// Unix permission bits.
    pub mode: u32,
}

#[derive(Serialize)]
struct AppContext<'a> {
    app_name: &'a str,
    app_dir: String,
    repo_branch: &'a str,
    compose_file: &'a str,
    model_name: &'a str,
    healthcheck_path: String,
}

impl<'a> AppContext<'a> {
    fn new(app: &'a AppConfig) -> Self {
        Self {
            app_name: &app.name,
            app_dir: app.app_dir.display().to_string(),
            repo_branch: &app.repo_branch,
            compose_file: &app.compose_file,
            model_name: &app.model_name,
            healthcheck_path: paths::healthcheck(&app.name).display().to_string(),
        }
    }
}

#[derive(Serialize)]
struct StartupContext<'a> {
    #[serde(flatten)]
    app: AppContext<'a>,
    repo_url: &'a str,
    public_host: Option<String>,
    env_file: String,
    daemon_json: String,
    healthcheck_script: String,
    update_script: String,
    update_path: String,
    cron_entry: String,
    cron_path: String,
    logrotate_config: String,
    logrotate_path: String,
}

/// Renders the embedded templates.
pub struct ScriptRenderer {
    handlebars: Handlebars<'static>,
}

impl ScriptRenderer {
    /// Create a renderer with every template registered.
    ///
    /// # Errors
    /// Returns an error if a template fails to compile.
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);

        for (name, template) in [
            ("startup", STARTUP_TEMPLATE),
            ("healthcheck", HEALTHCHECK_TEMPLATE),
            ("update", UPDATE_TEMPLATE),
            ("logrotate", LOGROTATE_TEMPLATE),
            ("cron", CRON_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, template)
                .with_context(|| format!("Failed to register template: {name}"))?;
        }

        Ok(Self { handlebars })
    }

    fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String> {
        self.handlebars
            .render(template, data)
            .with_context(|| format!("Failed to render template: {template}"))
    }

    /// The VM startup script.
    ///
    /// # Errors
    /// Returns an error if `REPO_URL` is unset or rendering fails.
    pub fn startup_script(&self, config: &DeployConfig) -> Result<String> {
        let app = &config.app;
        let repo_url = app.require_repo_url()?;
        let public_host = app
            .public_host
            .clone()
            .or_else(|| config.dns.as_ref().map(|dns| dns.domain.clone()));

        let env_file =
            EnvFile::defaults("${PUBLIC_HOST}", &app.model_name, &Secrets::shell_references());

        let context = StartupContext {
            app: AppContext::new(app),
            repo_url,
            public_host,
            env_file: env_file.render(),
            daemon_json: docker_daemon_config(),
            healthcheck_script: self.healthcheck_script(app)?,
            update_script: self.update_script(app)?,
            update_path: paths::update(&app.name).display().to_string(),
            cron_entry: self.cron_entry(app)?,
            cron_path: paths::cron(&app.name).display().to_string(),
            logrotate_config: self.logrotate_config(app)?,
            logrotate_path: paths::logrotate(&app.name).display().to_string(),
        };
        self.render("startup", &context)
    }

    /// Health-check script run by cron.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn healthcheck_script(&self, app: &AppConfig) -> Result<String> {
        self.render("healthcheck", &AppContext::new(app))
    }

    /// On-demand update script.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn update_script(&self, app: &AppConfig) -> Result<String> {
        self.render("update", &AppContext::new(app))
    }

    /// Cron entry running the health check every five minutes.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn cron_entry(&self, app: &AppConfig) -> Result<String> {
        self.render("cron", &AppContext::new(app))
    }

    /// Logrotate config for the bootstrap and health-check logs.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn logrotate_config(&self, app: &AppConfig) -> Result<String> {
        self.render("logrotate", &AppContext::new(app))
    }

    /// Every add-on file with its install path.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn addons(&self, app: &AppConfig) -> Result<Vec<AddonFile>> {
        Ok(vec![
            AddonFile {
                path: paths::healthcheck(&app.name),
                contents: self.healthcheck_script(app)?,
                mode: 0o755,
            },
            AddonFile {
                path: paths::update(&app.name),
                contents: self.update_script(app)?,
                mode: 0o755,
            },
            AddonFile {
                path: paths::cron(&app.name),
                contents: self.cron_entry(app)?,
                mode: 0o644,
            },
            AddonFile {
                path: paths::logrotate(&app.name),
                contents: self.logrotate_config(app)?,
                mode: 0o644,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    fn config(extra: &[(&str, &str)]) -> DeployConfig {
        let extra: Vec<(String, String)> = extra
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        DeployConfig::resolve(&ConfigFile::default(), &move |key| match key {
            "PROJECT_ID" => Some("demo".to_string()),
            "REPO_URL" => Some("https://github.com/acme/stack.git".to_string()),
            _ => extra.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
        })
        .unwrap()
    }

    #[test]
    fn test_startup_script_is_deterministic() {
        let renderer = ScriptRenderer::new().unwrap();
        let config = config(&[]);
        let a = renderer.startup_script(&config).unwrap();
        let b = renderer.startup_script(&config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_startup_script_contents() {
        let script = ScriptRenderer::new()
            .unwrap()
            .startup_script(&config(&[]))
            .unwrap();

        assert!(script.starts_with("#!/usr/bin/env bash\n"));
        assert!(script.contains(r#"REPO_URL="https://github.com/acme/stack.git""#));
        assert!(script.contains(r#"if [ -d "$APP_DIR/.git" ]; then"#));
        assert!(script.contains(r#"git -C "$APP_DIR" reset --hard "origin/$REPO_BRANCH""#));
        assert!(script.contains(r#"if [ ! -f "$APP_DIR/.env" ]; then"#));
        assert!(script.contains("POSTGRES_PASSWORD=${POSTGRES_PASSWORD}\n"));
        assert!(script.contains("metadata.google.internal"));
        assert!(script.contains("up -d --build"));
        assert!(script.contains("*/5 * * * * root /usr/local/bin/app-server-healthcheck"));
        assert!(script.contains("cat > /etc/logrotate.d/app-server <<'LOGROTATE'"));
        assert!(script.contains("\"max-size\": \"10m\""));
        assert!(!script.contains("&quot;"));
    }

    #[test]
    fn test_domain_becomes_public_host() {
        let script = ScriptRenderer::new()
            .unwrap()
            .startup_script(&config(&[("DNS_ZONE", "zone"), ("DOMAIN", "app.example.com")]))
            .unwrap();
        assert!(script.contains(r#"PUBLIC_HOST="app.example.com""#));
        assert!(!script.contains("metadata.google.internal"));
    }

    #[test]
    fn test_startup_script_requires_repo() {
        let config = DeployConfig::resolve(&ConfigFile::default(), &|key| match key {
            "PROJECT_ID" => Some("demo".to_string()),
            _ => None,
        })
        .unwrap();
        let err = ScriptRenderer::new()
            .unwrap()
            .startup_script(&config)
            .unwrap_err();
        assert!(err.to_string().contains("REPO_URL"));
    }

    #[test]
    fn test_addons_paths_and_modes() {
        let config = config(&[]);
        let addons = ScriptRenderer::new().unwrap().addons(&config.app).unwrap();
        let paths: Vec<_> = addons.iter().map(|a| a.path.display().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/usr/local/bin/app-server-healthcheck",
                "/usr/local/bin/app-server-update",
                "/etc/cron.d/app-server-healthcheck",
                "/etc/logrotate.d/app-server",
            ]
        );
        assert_eq!(addons[0].mode, 0o755);
        assert!(addons[0].contents.contains("--status exited"));
        assert!(addons[1].contents.contains("up -d --build --remove-orphans"));
        assert!(addons.iter().all(|a| a.contents.ends_with('\n')));
    }
}
