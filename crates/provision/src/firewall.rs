//! Network perimeter: the fixed set of inbound rules opened for the VM.

use hoist_cloud::{FirewallRule, PortRule};

use crate::config::{DeployConfig, ANY_SOURCE};

/// Well-known ports of the deployed stack.
pub mod ports {
    /// SSH.
    pub const SSH: u16 = 22;
    /// HTTP.
    pub const HTTP: u16 = 80;
    /// HTTPS.
    pub const HTTPS: u16 = 443;
    /// Database admin UI.
    pub const DB_ADMIN: u16 = 5050;
    /// Reverse proxy / container admin dashboard.
    pub const ADMIN: u16 = 8080;
    /// Frontend.
    pub const FRONTEND: u16 = 3000;
    /// Backend API.
    pub const BACKEND: u16 = 8000;
    /// PostgreSQL.
    pub const POSTGRES: u16 = 5432;
    /// Model-serving API (Ollama).
    pub const OLLAMA: u16 = 11434;
}

/// Why a rule exists. Determines its name suffix and ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePurpose {
    Ssh,
    Web,
    Admin,
    App,
    Database,
    ModelApi,
}

impl RulePurpose {
    /// Every rule, in creation order.
    pub const ALL: [Self; 6] = [
        Self::Ssh,
        Self::Web,
        Self::Admin,
        Self::App,
        Self::Database,
        Self::ModelApi,
    ];

    /// Name suffix.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Web => "web",
            Self::Admin => "admin",
            Self::App => "app",
            Self::Database => "db",
            Self::ModelApi => "model-api",
        }
    }

    /// TCP ports opened by the rule.
    #[must_use]
    pub fn ports(self) -> &'static [u16] {
        match self {
            Self::Ssh => &[ports::SSH],
            Self::Web => &[ports::HTTP, ports::HTTPS],
            Self::Admin => &[ports::DB_ADMIN, ports::ADMIN],
            Self::App => &[ports::FRONTEND, ports::BACKEND],
            Self::Database => &[ports::POSTGRES],
            Self::ModelApi => &[ports::OLLAMA],
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Ssh => "SSH access",
            Self::Web => "HTTP and HTTPS",
            Self::Admin => "Administrative web consoles",
            Self::App => "Application frontend and backend",
            Self::Database => "PostgreSQL (restrict before production use)",
            Self::ModelApi => "Model-serving API (restrict before production use)",
        }
    }
}

/// Build the desired firewall rules for a deployment.
#[must_use]
pub fn firewall_rules(config: &DeployConfig) -> Vec<FirewallRule> {
    RulePurpose::ALL
        .iter()
        .map(|purpose| FirewallRule {
            name: config.firewall_rule_name(purpose.slug()),
            network: config.network.clone(),
            description: Some(purpose.description().to_string()),
            allowed: vec![PortRule::tcp(purpose.ports())],
            source_ranges: config.source_ranges.clone(),
            target_tags: vec![config.network_tag()],
        })
        .collect()
}

/// Whether the rule admits traffic from any address.
#[must_use]
pub fn is_open_to_internet(rule: &FirewallRule) -> bool {
    rule.source_ranges.iter().any(|r| r == ANY_SOURCE)
}
