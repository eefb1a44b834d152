//! Sudo keep-alive.
//!
//! Long steps (Homebrew, Docker) outlive the sudo timestamp, so after the
//! privilege step primes it a background task refreshes it with a
//! non-interactive `sudo -n -v` until the run ends. While the task runs a
//! marker file exists in the data directory; its removal on shutdown is the
//! signal that no refresher is left behind.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::BootstrapConfig;

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Handle for the refresh task. Must be shut down on every exit path
/// (success, fatal abort, or interrupt) so the marker never outlives the run.
pub struct PrivilegeKeepAlive {
    marker: PathBuf,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PrivilegeKeepAlive {
    /// Write the marker file and start the refresh loop. The loop stops when
    /// `parent` is cancelled or [`shutdown`](Self::shutdown) runs.
    pub async fn start(config: &BootstrapConfig, parent: &CancellationToken) -> Result<Self> {
        let marker = config.keepalive_marker();
        tokio::fs::write(&marker, format!("{}\n", std::process::id()))
            .await
            .with_context(|| format!("cannot write {}", marker.display()))?;

        let cancel = parent.child_token();
        let sudo = config.sudo_program.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => refresh(&sudo).await,
                    _ = loop_cancel.cancelled() => break,
                }
            }
        });

        Ok(Self {
            marker,
            cancel,
            handle: Some(handle),
        })
    }

    /// Stop the refresh loop and wait for it. The marker is removed in
    /// `Drop`, which also covers paths that never reach this call.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for PrivilegeKeepAlive {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = std::fs::remove_file(&self.marker);
    }
}

/// One refresh attempt. Failure is logged and tolerated: a missed refresh
/// only means sudo may re-prompt later.
async fn refresh(sudo: &str) {
    let status = tokio::process::Command::new(sudo)
        .args(["-n", "-v"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(s) if s.success() => {}
        Ok(s) => warn!(code = ?s.code(), "sudo timestamp refresh failed"),
        Err(err) => warn!(err = %err, "sudo timestamp refresh could not run"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config_in(dir: &Path) -> BootstrapConfig {
        BootstrapConfig {
            data_dir: dir.to_path_buf(),
            home_dir: dir.to_path_buf(),
            workspace_dir: dir.join("dev"),
            repo_url: "git@github.com:acme-dev/monorepo.git".to_string(),
            ssh_key: dir.join(".ssh").join("id_ed25519"),
            brew_bin: "brew".to_string(),
            sudo_program: "true".to_string(),
        }
    }

    #[tokio::test]
    async fn marker_exists_while_running_and_is_removed_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let marker = config.keepalive_marker();

        let keepalive = PrivilegeKeepAlive::start(&config, &CancellationToken::new())
            .await
            .unwrap();
        assert!(marker.exists());

        keepalive.shutdown().await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn failing_refresh_does_not_break_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.sudo_program = "false".to_string();
        let marker = config.keepalive_marker();

        let keepalive = PrivilegeKeepAlive::start(&config, &CancellationToken::new())
            .await
            .unwrap();
        // First tick fires immediately and runs the failing refresher.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(marker.exists());

        keepalive.shutdown().await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn drop_removes_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let marker = config.keepalive_marker();

        let keepalive = PrivilegeKeepAlive::start(&config, &CancellationToken::new())
            .await
            .unwrap();
        assert!(marker.exists());
        drop(keepalive);
        assert!(!marker.exists());
    }
}
