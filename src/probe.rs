use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

// ─── Probe ────────────────────────────────────────────────────────────────────

/// A step precondition: answers "does this step's effect already hold?"
/// without causing the effect.
///
/// Probes are queries, never mutations: a probe may read the filesystem,
/// the environment, or run a read-only status command, but it must not
/// install, write, or generate anything. When a probe reports satisfied,
/// the orchestrator skips the step entirely.
#[derive(Debug, Clone)]
pub enum Probe {
    /// The named executable resolves on PATH.
    Binary(&'static str),
    /// The path exists (file or directory).
    PathExists(PathBuf),
    /// The command exits 0. Output is discarded. Meant for read-only status
    /// commands such as `gh auth status`.
    Command { program: String, args: Vec<String> },
    /// The file exists and contains the literal text. Used for managed-block
    /// markers in profiles and config files.
    FileContains(PathBuf, String),
    /// The environment variable is set and non-empty.
    EnvSet(&'static str),
    /// Never satisfied; for actions that are cheap no-ops when repeated
    /// (incremental installs, migrations) and carry their own idempotence.
    Never,
    /// Every inner probe is satisfied.
    All(Vec<Probe>),
    /// At least one inner probe is satisfied.
    Any(Vec<Probe>),
}

impl Probe {
    pub fn satisfied(&self) -> bool {
        match self {
            Probe::Binary(name) => find_on_path(name).is_some(),
            Probe::PathExists(path) => path.exists(),
            Probe::Command { program, args } => Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false),
            Probe::FileContains(path, needle) => std::fs::read_to_string(path)
                .map(|text| text.contains(needle.as_str()))
                .unwrap_or(false),
            Probe::EnvSet(name) => std::env::var(name)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false),
            Probe::Never => false,
            Probe::All(inner) => inner.iter().all(Probe::satisfied),
            Probe::Any(inner) => inner.iter().any(Probe::satisfied),
        }
    }

    /// One-line description for the doctor report.
    pub fn describe(&self) -> String {
        match self {
            Probe::Binary(name) => format!("`{name}` on PATH"),
            Probe::PathExists(path) => format!("{} exists", path.display()),
            Probe::Command { program, args } => {
                format!("`{} {}` succeeds", program, args.join(" "))
            }
            Probe::FileContains(path, needle) => {
                format!("`{}` in {}", needle, path.display())
            }
            Probe::EnvSet(name) => format!("${name} is set"),
            Probe::Never => "always runs".to_string(),
            Probe::All(inner) => inner
                .iter()
                .map(Probe::describe)
                .collect::<Vec<_>>()
                .join(" and "),
            Probe::Any(inner) => inner
                .iter()
                .map(Probe::describe)
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }
}

// ─── PATH lookup ──────────────────────────────────────────────────────────────

/// Resolve `program` against PATH the way the shell would.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    find_in_dirs(std::env::split_paths(&path), program)
}

fn find_in_dirs(dirs: impl Iterator<Item = PathBuf>, program: &str) -> Option<PathBuf> {
    for dir in dirs {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.is_file()
        && std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
