//! Declarative reconciliation: diff a [`Blueprint`] against live state, then
//! apply only the differences.

use std::fmt;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use hoist_cloud::CloudProvider;

use crate::blueprint::{Blueprint, DesiredResource};
use crate::reconcile::{self, ApiGate, Outputs};
use crate::resource::{ResourceId, ResourceKind};

/// What to do with one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "changes", rename_all = "snake_case")]
pub enum Action {
    /// The resource does not exist.
    Create,
    /// The resource exists and the listed fields will be changed in place.
    Update(Vec<String>),
    /// Live state matches.
    NoChange,
    /// The listed fields differ but cannot be changed in place. Reported, never applied.
    Drift(Vec<String>),
    /// The resource exists and will be removed.
    Delete,
}

impl Action {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update(_) => "~",
            Self::NoChange => "=",
            Self::Drift(_) => "!",
            Self::Delete => "-",
        }
    }
}

/// One line of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub resource: ResourceId,
    #[serde(flatten)]
    pub action: Action,
}

impl fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action.symbol(), self.resource)?;
        if let Action::Update(fields) | Action::Drift(fields) = &self.action {
            for field in fields {
                write!(f, "\n    {field}")?;
            }
        }
        Ok(())
    }
}

/// The changes needed to reach the blueprint, plus what was learned while
/// observing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub changes: Vec<PlannedChange>,
    pub outputs: Outputs,
}

impl Plan {
    /// Whether applying would change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|c| matches!(c.action, Action::NoChange | Action::Drift(_)))
    }

    /// Counts of creates, updates and deletes.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        self.changes.iter().fold((0, 0, 0), |(add, change, destroy), c| {
            match c.action {
                Action::Create => (add + 1, change, destroy),
                Action::Update(_) => (add, change + 1, destroy),
                Action::Delete => (add, change, destroy + 1),
                Action::NoChange | Action::Drift(_) => (add, change, destroy),
            }
        })
    }

    /// `N to add, N to change, N to destroy`.
    #[must_use]
    pub fn summary(&self) -> String {
        let (add, change, destroy) = self.counts();
        format!("{add} to add, {change} to change, {destroy} to destroy")
    }

    /// Changes reported as drift.
    pub fn drift(&self) -> impl Iterator<Item = &PlannedChange> {
        self.changes
            .iter()
            .filter(|c| matches!(c.action, Action::Drift(_)))
    }
}

/// Observe every resource and compute the changes.
///
/// While an API is still disabled, resources behind it cannot be read and
/// are planned as creates.
///
/// # Errors
/// Returns an error if live state cannot be read.
pub async fn plan(blueprint: &Blueprint, provider: &dyn CloudProvider) -> Result<Plan> {
    let mut outputs = Outputs::default();
    let mut changes = Vec::with_capacity(blueprint.resources().len());
    let mut gate = ApiGate::default();

    for resource in blueprint.resources() {
        let id = resource.id();

        let readable = gate
            .allows(provider, resource)
            .await
            .with_context(|| format!("Failed to read {id}"))?;
        let action = if readable {
            let live = reconcile::observe(provider, resource, &mut outputs)
                .await
                .with_context(|| format!("Failed to read {id}"))?;
            if let DesiredResource::Api { service } = resource {
                gate.record(service, live.is_some());
            }
            match live {
                Some(live) => reconcile::diff(resource, &live, &outputs),
                None => Action::Create,
            }
        } else {
            Action::Create
        };

        changes.push(PlannedChange {
            resource: id,
            action,
        });
    }

    let plan = Plan { changes, outputs };
    info!(summary = %plan.summary(), "Plan computed");
    Ok(plan)
}

/// Plan removal of every existing resource, newest first. APIs are not
/// part of a destroy plan, and nothing behind a disabled API exists.
///
/// # Errors
/// Returns an error if live state cannot be read.
pub async fn plan_destroy(blueprint: &Blueprint, provider: &dyn CloudProvider) -> Result<Plan> {
    let mut outputs = Outputs::default();
    let mut changes = Vec::new();
    let mut gate = ApiGate::default();

    for resource in blueprint.resources().iter().rev() {
        let id = resource.id();
        if id.kind == ResourceKind::Api {
            continue;
        }

        let live = reconcile::observe_existing(provider, resource, &mut gate, &mut outputs)
            .await
            .with_context(|| format!("Failed to read {id}"))?;
        if live.is_some() {
            changes.push(PlannedChange {
                resource: id,
                action: Action::Delete,
            });
        }
    }

    let plan = Plan { changes, outputs };
    info!(summary = %plan.summary(), "Destroy plan computed");
    Ok(plan)
}

/// Execute a plan in order. Stops at the first failure.
///
/// # Errors
/// Returns an error if the plan does not match the blueprint or a change fails.
pub async fn apply(
    plan: &Plan,
    blueprint: &Blueprint,
    provider: &dyn CloudProvider,
) -> Result<Outputs> {
    let mut outputs = plan.outputs.clone();

    for change in &plan.changes {
        let resource: &DesiredResource = blueprint
            .get(&change.resource)
            .with_context(|| format!("{} is not part of the blueprint", change.resource))?;

        match &change.action {
            Action::Create => reconcile::create(provider, resource, &mut outputs).await?,
            Action::Update(_) => reconcile::update(provider, resource, &outputs).await?,
            Action::NoChange => {
                reconcile::ensure_bindings(provider, resource, &outputs).await?;
            }
            Action::Drift(fields) => {
                warn!(
                    resource = %change.resource,
                    fields = %fields.join("; "),
                    "Drift detected; recreate the resource to converge"
                );
                reconcile::ensure_bindings(provider, resource, &outputs).await?;
            }
            Action::Delete => {
                info!(resource = %change.resource, "Deleting");
                reconcile::delete(provider, resource)
                    .await
                    .with_context(|| format!("Failed to delete {}", change.resource))?;
            }
        }
    }

    let (add, change, destroy) = plan.counts();
    info!(
        added = add,
        changed = change,
        destroyed = destroy,
        "Apply complete"
    );
    Ok(outputs)
}
