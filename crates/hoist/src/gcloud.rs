//! Fallbacks to the local `gcloud` installation for credentials and the
//! default project.

use std::process::Command;

use anyhow::{bail, Context, Result};

fn gcloud(args: &[&str]) -> Result<String> {
    let output = Command::new("gcloud")
        .args(args)
        .output()
        .context("Failed to execute gcloud (install the Google Cloud SDK or set the variables explicitly)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("gcloud {} failed: {}", args.join(" "), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Access token of the active gcloud account.
pub fn access_token() -> Result<String> {
    let token = gcloud(&["auth", "print-access-token"])?;
    if token.is_empty() {
        bail!("gcloud returned an empty access token; run `gcloud auth login`");
    }
    Ok(token)
}

/// Project configured in gcloud, if any.
pub fn default_project() -> Option<String> {
    gcloud(&["config", "get-value", "project"])
        .ok()
        .filter(|p| !p.is_empty() && p != "(unset)")
}
