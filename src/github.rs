//! GitHub credentials and session.
//!
//! Provisioning leaves three artifacts behind: the access token file, an
//! ed25519 key pair, and a managed `Host github.com` stanza in the SSH
//! config. Each one doubles as the idempotence marker for its own creation:
//! present means done, absent means (re)create.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::prompt::{PromptError, TokenSource};
use crate::runner::StepRunner;
use crate::shellrc;
use crate::step::CommandSpec;

/// Name of the managed `Host github.com` block in the SSH config.
pub const SSH_CONFIG_BLOCK: &str = "github-ssh";

/// Provision the credential artifacts. Only missing pieces are created, so a
/// re-run after a partial failure fills the gaps without touching what
/// already exists.
pub async fn provision_auth(
    runner: &StepRunner,
    config: &BootstrapConfig,
    tokens: &dyn TokenSource,
) -> Result<i32> {
    // Token first: when the prompt yields nothing the step must fail before
    // any other artifact is created.
    let token_file = config.token_file();
    if !file_has_content(&token_file) {
        let entered = tokens.github_token()?;
        let token = entered.trim();
        if token.is_empty() {
            return Err(PromptError::Empty("github token").into());
        }
        write_token(&token_file, token)?;
        info!(path = %token_file.display(), "access token stored");
    }

    if !config.ssh_key.exists() {
        let ssh_dir = config.ssh_dir();
        std::fs::create_dir_all(&ssh_dir)
            .with_context(|| format!("cannot create {}", ssh_dir.display()))?;
        set_mode(&ssh_dir, 0o700)?;

        let key = config.ssh_key.display().to_string();
        let keygen = CommandSpec::new("ssh-keygen", &["-t", "ed25519", "-N", "", "-f", &key]);
        let captured = runner.capture(&keygen).await?;
        if captured.code != 0 {
            return Ok(captured.code);
        }
    }

    shellrc::ensure_block(
        &config.ssh_config(),
        SSH_CONFIG_BLOCK,
        &ssh_config_stanza(&config.ssh_key),
    )?;
    Ok(0)
}

/// Sign `gh` in with the stored token, then register the public key.
pub async fn establish_session(runner: &StepRunner, config: &BootstrapConfig) -> Result<i32> {
    let login = CommandSpec::new("gh", &["auth", "login", "--with-token"])
        .stdin_file(config.token_file());
    let captured = runner.capture(&login).await?;
    if captured.code != 0 {
        return Ok(captured.code);
    }

    let public_key = format!("{}.pub", config.ssh_key.display());
    let add_key = CommandSpec::new("gh", &["ssh-key", "add", &public_key, "--title", "devup"]);
    let captured = runner.capture(&add_key).await?;
    if captured.code != 0 {
        // `gh` rejects keys that are already registered; the session log has
        // the full answer, and an existing registration is fine.
        warn!(code = captured.code, "ssh key registration was not accepted");
    }
    Ok(0)
}

fn ssh_config_stanza(key: &Path) -> String {
    format!(
        "Host github.com\n  User git\n  IdentityFile {}\n  IdentitiesOnly yes\n  AddKeysToAgent yes",
        key.display()
    )
}

fn file_has_content(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)
}

/// Write the token with user-only permissions (mode 0600 on Unix).
fn write_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, token).with_context(|| format!("cannot write {}", path.display()))?;
    set_mode(path, 0o600)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("cannot set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
