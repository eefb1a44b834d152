use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::probe::find_on_path;

const DEFAULT_REPO_URL: &str = "git@github.com:acme-dev/monorepo.git";
const DEFAULT_WORKSPACE: &str = "dev";

// Homebrew's install prefix differs between Apple Silicon and Intel macs;
// the native prefix for this build comes first.
#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
const BREW_FALLBACKS: &[&str] = &["/opt/homebrew/bin/brew", "/usr/local/bin/brew"];
#[cfg(all(target_os = "macos", not(target_arch = "aarch64")))]
const BREW_FALLBACKS: &[&str] = &["/usr/local/bin/brew", "/opt/homebrew/bin/brew"];
#[cfg(not(target_os = "macos"))]
const BREW_FALLBACKS: &[&str] = &["/home/linuxbrew/.linuxbrew/bin/brew"];

// ─── BootstrapConfig ──────────────────────────────────────────────────────────

/// Paths and programs resolved once at startup and shared read-only by the
/// orchestrator, the step runner, and the doctor.
///
/// Priority (highest to lowest):
///   1. CLI flags, passed as `Some(value)` from clap
///   2. Environment (`DEVUP_DATA_DIR`, `DEVUP_REPO`)
///   3. Built-in defaults
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Where devup keeps its own state: token file, keep-alive marker,
    /// session log, diagnostic log.
    pub data_dir: PathBuf,
    /// The user's home directory.
    pub home_dir: PathBuf,
    /// Parent directory the monorepo is cloned under (`~/dev`).
    pub workspace_dir: PathBuf,
    /// Clone URL for the monorepo (`DEVUP_REPO` overrides).
    pub repo_url: String,
    /// SSH private key path. Its presence is the "keys exist" marker.
    pub ssh_key: PathBuf,
    /// Resolved `brew` invocation: the PATH entry when already installed,
    /// otherwise the first existing install prefix for this platform.
    pub brew_bin: String,
    /// Program used for privilege elevation. Tests substitute `true`.
    pub sudo_program: String,
}

impl BootstrapConfig {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let home_dir = std::env::var("HOME")
            .map(PathBuf::from)
            .context("HOME is not set; cannot locate the user home directory")?;

        let data_dir = data_dir
            .or_else(|| std::env::var("DEVUP_DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        let repo_url = std::env::var("DEVUP_REPO")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_REPO_URL.to_string());

        let brew_bin = find_on_path("brew")
            .map(|p| p.display().to_string())
            .unwrap_or_else(default_brew_bin);

        Ok(Self {
            workspace_dir: home_dir.join(DEFAULT_WORKSPACE),
            ssh_key: home_dir.join(".ssh").join("id_ed25519"),
            data_dir,
            home_dir,
            repo_url,
            brew_bin,
            sudo_program: "sudo".to_string(),
        })
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("cannot create data directory {}", self.data_dir.display()))
    }

    // ─── Derived paths ───────────────────────────────────────────────────────

    /// GitHub access token, mode 0600 on Unix.
    pub fn token_file(&self) -> PathBuf {
        self.data_dir.join("github_token")
    }

    /// Marker owned by the sudo keep-alive task while it runs.
    pub fn keepalive_marker(&self) -> PathBuf {
        self.data_dir.join("keepalive.pid")
    }

    /// Append-only raw output of every executed step action.
    pub fn session_log(&self) -> PathBuf {
        self.data_dir.join("session.log")
    }

    /// Structured tracing diagnostics. Kept separate from the session log so
    /// the two never interleave.
    pub fn diagnostic_log(&self) -> PathBuf {
        self.data_dir.join("devup.log")
    }

    /// Local checkout directory of the monorepo, derived from the clone URL.
    pub fn repo_dir(&self) -> PathBuf {
        self.workspace_dir.join(repo_name(&self.repo_url))
    }

    pub fn ssh_dir(&self) -> PathBuf {
        self.home_dir.join(".ssh")
    }

    pub fn ssh_config(&self) -> PathBuf {
        self.ssh_dir().join("config")
    }

    /// Login shell startup file holding the managed Homebrew block.
    pub fn shell_profile(&self) -> PathBuf {
        self.home_dir.join(".zprofile")
    }

    pub fn aws_config(&self) -> PathBuf {
        self.home_dir.join(".aws").join("config")
    }

    /// AWS config template bundled in the cloned repository.
    pub fn aws_config_template(&self) -> PathBuf {
        self.repo_dir().join("tools").join("aws").join("config.template")
    }

    /// PATH for child commands: the brew bin directory is prepended so tools
    /// installed earlier in the same run resolve without a shell reload.
    pub fn child_path(&self) -> OsString {
        let current = std::env::var_os("PATH").unwrap_or_default();
        let brew_dir = match Path::new(&self.brew_bin).parent() {
            // Bare "brew" means it is already on PATH; nothing to prepend.
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => return current,
        };
        if std::env::split_paths(&current).any(|p| p == brew_dir) {
            return current;
        }
        let entries = std::iter::once(brew_dir).chain(std::env::split_paths(&current));
        std::env::join_paths(entries).unwrap_or(current)
    }
}

/// Checkout directory name for a clone URL: last path segment, `.git` stripped.
pub fn repo_name(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    let tail = trimmed
        .rsplit(['/', ':'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("repo");
    tail.strip_suffix(".git").unwrap_or(tail)
}

fn default_brew_bin() -> String {
    first_existing(BREW_FALLBACKS)
        .unwrap_or(BREW_FALLBACKS[0])
        .to_string()
}

fn first_existing<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|p| Path::new(p).exists())
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("devup");
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        // $XDG_DATA_HOME/devup or ~/.local/share/devup
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("devup");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("devup");
        }
    }
    // Fallback
    PathBuf::from(".devup")
}

// ─── Tests ────────────────────────────────────────────────────────────────────
