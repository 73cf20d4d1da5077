//! GCP (Google Cloud Platform) provider.
//!
//! Implements the [`CloudProvider`](crate::CloudProvider) trait for Google Cloud.
//!
//! ## Services
//!
//! - **Compute Engine** - VM instances, firewall rules, static addresses
//! - **IAM** / **Resource Manager** - service accounts and project role bindings
//! - **Service Usage** - API enablement
//! - **Cloud DNS** - optional A record for the instance
//!
//! ## Machine Types
//!
//! - **e2-standard-2**: 2 vCPU, 8GB RAM - small stacks without a local model
//! - **e2-standard-4**: 4 vCPU, 16GB RAM - default, fits a quantized 8B model
//! - **e2-highmem-4**: 4 vCPU, 32GB RAM - larger models on CPU

mod client;
mod models;

pub use client::Gcp;
pub use models::*;
