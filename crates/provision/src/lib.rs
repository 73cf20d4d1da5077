//! Single-VM application deployment on Google Cloud.
//!
//! Two provisioning paths share one set of resource operations:
//!
//! - [`setup::Provisioner`] walks the resources once, creating what is
//!   missing and skipping what exists.
//! - [`plan::plan`] / [`plan::apply`] diff a [`blueprint::Blueprint`] against
//!   live state and apply only the delta.
//!
//! [`cleanup::Teardown`] removes everything again. The [`host`] module holds
//! the commands that run on the VM: bootstrap, health check and update.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hoist_cloud::gcp::Gcp;
//! use hoist_provision::config::{ConfigFile, DeployConfig};
//! use hoist_provision::setup::Provisioner;
//!
//! let config = DeployConfig::resolve(&ConfigFile::default(), &|k| std::env::var(k).ok())?;
//! let gcp = Gcp::new(&config.project_id, &token, &config.zone)?;
//! let report = Provisioner::for_config(Arc::new(gcp), &config)?.run().await?;
//! println!("external ip: {:?}", report.external_ip);
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod blueprint;
pub mod cleanup;
pub mod config;
pub mod env_file;
pub mod firewall;
pub mod host;
pub mod plan;
mod reconcile;
pub mod resource;
pub mod scripts;
pub mod setup;

pub use blueprint::{Blueprint, DesiredResource};
pub use cleanup::{Teardown, TeardownReport};
pub use config::{AppConfig, ConfigError, ConfigFile, DeployConfig};
pub use plan::{Action, Plan, PlannedChange};
pub use reconcile::Outputs;
pub use resource::{ResourceId, ResourceKind};
pub use setup::{Provisioner, SetupReport};
