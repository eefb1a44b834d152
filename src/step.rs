use std::path::PathBuf;

use crate::probe::Probe;

// ─── Criticality ──────────────────────────────────────────────────────────────

/// How a step failure affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Abort the whole run; the process exit status propagates the step's
    /// exit status.
    Fatal,
    /// Print the failure and continue with the next step.
    Advisory,
}

// ─── CommandSpec ──────────────────────────────────────────────────────────────

/// An external command plus the context it runs in.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// File fed to the child's stdin (`gh auth login --with-token < file`).
    pub stdin_file: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: Vec::new(),
            stdin_file: None,
        }
    }

    /// `sh -c` wrapper for pipelines and `&&` chains.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.into()],
            cwd: None,
            env: Vec::new(),
            stdin_file: None,
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    /// `program arg arg…` for log lines and error messages.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

// ─── Actions ──────────────────────────────────────────────────────────────────

/// In-process actions that are more than a single external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    /// Run the Homebrew installer, then write the shellenv block into the
    /// shell profile.
    InstallHomebrew,
    /// Capture the access token, generate the SSH key pair, write the SSH
    /// config stanza.
    ProvisionGithubAuth,
    /// `gh auth login` with the stored token, then register the public key.
    EstablishGithubSession,
    /// Copy the AWS config template from the cloned repo into `~/.aws`.
    InstallAwsConfig,
}

impl BuiltinAction {
    /// Builtins that prompt on the terminal run without the spinner.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::ProvisionGithubAuth)
    }
}

/// What the runner executes when a step's precondition does not hold.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Spawned with output captured into the session log; a spinner renders
    /// on the terminal until the command exits.
    Command(CommandSpec),
    /// Terminal attached (password prompts, browser hand-offs). No spinner.
    Interactive(CommandSpec),
    /// In-process action; spinner unless the builtin itself prompts.
    Builtin(BuiltinAction),
}

// ─── Step and Plan ────────────────────────────────────────────────────────────

/// One bootstrap step: skipped when `precondition` holds, otherwise `action`
/// runs through the step runner.
#[derive(Debug, Clone)]
pub struct Step {
    pub label: &'static str,
    pub precondition: Probe,
    pub action: StepAction,
    pub criticality: Criticality,
}

/// The full ordered sequence. The privilege step is held apart because the
/// sudo keep-alive starts right after it and must outlive every later step.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Interactive sudo prime; runs (or skips) before everything else.
    pub privileges: Step,
    pub steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_spec_builder_collects_context() {
        let spec = CommandSpec::new("git", &["clone", "url"])
            .cwd("/tmp")
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin_file("/tmp/token");
        assert_eq!(spec.program, "git");
        assert_eq!(spec.args, vec!["clone", "url"]);
        assert_eq!(spec.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(spec.env.len(), 1);
        assert!(spec.stdin_file.is_some());
        assert_eq!(spec.display(), "git clone url");
    }

    #[test]
    fn shell_spec_wraps_the_script() {
        let spec = CommandSpec::shell("a && b");
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args, vec!["-c", "a && b"]);
    }

    #[test]
    fn only_the_credential_builtin_is_interactive() {
        assert!(BuiltinAction::ProvisionGithubAuth.is_interactive());
        assert!(!BuiltinAction::InstallHomebrew.is_interactive());
        assert!(!BuiltinAction::EstablishGithubSession.is_interactive());
        assert!(!BuiltinAction::InstallAwsConfig.is_interactive());
    }
}
