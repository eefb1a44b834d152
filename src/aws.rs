//! AWS CLI configuration.

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::BootstrapConfig;

/// Install `~/.aws/config` from the template bundled in the monorepo.
/// An existing config is never overwritten; it may hold local edits.
pub fn install_config(config: &BootstrapConfig) -> Result<i32> {
    let template = config.aws_config_template();
    if !template.exists() {
        bail!(
            "AWS config template missing at {}; is the monorepo checkout complete?",
            template.display()
        );
    }

    let target = config.aws_config();
    if target.exists() {
        return Ok(0);
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::copy(&template, &target).with_context(|| {
        format!(
            "cannot copy {} to {}",
            template.display(),
            target.display()
        )
    })?;
    info!(path = %target.display(), "AWS config installed");
    Ok(0)
}
