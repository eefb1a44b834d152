//! Homebrew installation.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::config::BootstrapConfig;
use crate::probe::find_on_path;
use crate::runner::StepRunner;
use crate::shellrc::{self, BlockChange};
use crate::step::CommandSpec;

const INSTALL_SCRIPT_URL: &str =
    "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh";

/// Name of the managed `brew shellenv` block in the shell profile.
pub const PROFILE_BLOCK: &str = "homebrew";

/// Run the upstream installer non-interactively, then wire `brew shellenv`
/// into the shell profile through a managed block. A rerun can find brew
/// present with the profile block still missing; only the missing piece is
/// done. Returns the installer's exit code on failure; the profile is only
/// touched once brew is in place.
pub async fn install(runner: &StepRunner, config: &BootstrapConfig) -> Result<i32> {
    if !brew_installed(config) {
        let captured = runner.capture(&install_command()).await?;
        if captured.code != 0 {
            return Ok(captured.code);
        }
    }

    let profile = config.shell_profile();
    let block = format!("eval \"$({} shellenv)\"", config.brew_bin);
    match shellrc::ensure_block(&profile, PROFILE_BLOCK, &block)? {
        BlockChange::Unchanged => {}
        change => info!(?change, profile = %profile.display(), "shell profile updated"),
    }
    Ok(0)
}

fn brew_installed(config: &BootstrapConfig) -> bool {
    find_on_path("brew").is_some() || Path::new(&config.brew_bin).exists()
}

fn install_command() -> CommandSpec {
    CommandSpec::shell(format!("curl -fsSL {INSTALL_SCRIPT_URL} | bash"))
        .env("NONINTERACTIVE", "1")
}
