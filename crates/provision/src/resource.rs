//! Resource identity shared by the reconcilers and their reports.

use serde::Serialize;

/// Kind of a managed cloud resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// An enabled Google API.
    Api,
    /// The VM service account.
    ServiceAccount,
    /// An ingress firewall rule.
    FirewallRule,
    /// The reserved external address.
    StaticIp,
    /// The VM.
    Instance,
    /// The optional DNS A record.
    DnsRecord,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::ServiceAccount => write!(f, "service account"),
            Self::FirewallRule => write!(f, "firewall rule"),
            Self::StaticIp => write!(f, "static ip"),
            Self::Instance => write!(f, "instance"),
            Self::DnsRecord => write!(f, "dns record"),
        }
    }
}

/// A named resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceId {
    /// Kind.
    pub kind: ResourceKind,
    /// Provider-side name.
    pub name: String,
}

impl ResourceId {
    /// Create an id.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}
