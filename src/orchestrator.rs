//! Setup orchestration.
//!
//! Walks the plan in order: evaluate each precondition, skip satisfied
//! steps with a notice, run the rest through the step runner, and decide
//! from the step's criticality whether a failure aborts the run. The sudo
//! keep-alive starts right after the privilege step and is shut down on
//! every return path, so its marker never survives the process.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::privilege::PrivilegeKeepAlive;
use crate::prompt::TokenSource;
use crate::runner::{StepReport, StepRunner, EXIT_INTERRUPTED};
use crate::session_log::SessionLog;
use crate::step::{BuiltinAction, Criticality, Plan, Step, StepAction};
use crate::{aws, github, homebrew};

const GREEN: &str = "\x1b[32m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A fatal step ran and reported a non-zero exit status.
    #[error("step '{label}' failed (exit {code})")]
    StepFailed { label: &'static str, code: i32 },
    /// The run was cancelled from outside (interrupt signal).
    #[error("interrupted")]
    Interrupted,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BootstrapError {
    /// Process exit status: a failed step's own status is propagated.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StepFailed { code, .. } if *code != 0 => *code,
            Self::StepFailed { .. } => 1,
            Self::Interrupted => EXIT_INTERRUPTED,
            Self::Other(_) => 1,
        }
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

pub struct Orchestrator {
    config: BootstrapConfig,
    log: Arc<SessionLog>,
    runner: StepRunner,
    tokens: Arc<dyn TokenSource>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: BootstrapConfig,
        tokens: Arc<dyn TokenSource>,
        cancel: CancellationToken,
    ) -> Self {
        let log = Arc::new(SessionLog::new(config.session_log()));
        let runner = StepRunner::new(&config, Arc::clone(&log), cancel.clone());
        Self {
            config,
            log,
            runner,
            tokens,
            cancel,
        }
    }

    /// Execute the whole plan in order.
    pub async fn run(&self, plan: &Plan) -> Result<(), BootstrapError> {
        let run_id = self.log.begin_run().await;
        info!(%run_id, log = %self.log.path().display(), "bootstrap run starting");

        // Privileges come first; the keep-alive only exists once they do.
        self.run_step(&plan.privileges).await?;
        let keepalive = PrivilegeKeepAlive::start(&self.config, &self.cancel).await?;

        let outcome = self.run_steps(&plan.steps).await;
        keepalive.shutdown().await;
        outcome?;

        self.print_banner();
        Ok(())
    }

    async fn run_steps(&self, steps: &[Step]) -> Result<(), BootstrapError> {
        for step in steps {
            if self.cancel.is_cancelled() {
                return Err(BootstrapError::Interrupted);
            }
            self.run_step(step).await?;
        }
        Ok(())
    }

    async fn run_step(&self, step: &Step) -> Result<(), BootstrapError> {
        if step.precondition.satisfied() {
            println!("{DIM}◦ {} (already satisfied){RESET}", step.label);
            self.log
                .append_line(&format!(
                    "{} skipped: {}",
                    step.label,
                    step.precondition.describe()
                ))
                .await;
            return Ok(());
        }

        let report = match self.execute(step).await {
            Ok(report) => report,
            Err(err) => {
                if self.cancel.is_cancelled() {
                    return Err(BootstrapError::Interrupted);
                }
                match step.criticality {
                    Criticality::Fatal => return Err(BootstrapError::Other(err)),
                    Criticality::Advisory => {
                        warn!(step = step.label, err = %format!("{err:#}"), "advisory step errored, continuing");
                        return Ok(());
                    }
                }
            }
        };

        if report.exit_code == 0 {
            return Ok(());
        }
        if report.exit_code == EXIT_INTERRUPTED && self.cancel.is_cancelled() {
            return Err(BootstrapError::Interrupted);
        }
        match step.criticality {
            Criticality::Fatal => Err(BootstrapError::StepFailed {
                label: step.label,
                code: report.exit_code,
            }),
            Criticality::Advisory => {
                warn!(step = step.label, code = report.exit_code, "advisory step failed, continuing");
                Ok(())
            }
        }
    }

    async fn execute(&self, step: &Step) -> Result<StepReport> {
        match &step.action {
            StepAction::Command(spec) => self.runner.run_command(step.label, spec).await,
            StepAction::Interactive(spec) => self.runner.run_interactive(step.label, spec).await,
            StepAction::Builtin(builtin) => {
                self.runner
                    .run_builtin(step.label, builtin.is_interactive(), self.dispatch(*builtin))
                    .await
            }
        }
    }

    /// The in-process behavior behind each builtin step.
    async fn dispatch(&self, builtin: BuiltinAction) -> Result<i32> {
        match builtin {
            BuiltinAction::InstallHomebrew => homebrew::install(&self.runner, &self.config).await,
            BuiltinAction::ProvisionGithubAuth => {
                github::provision_auth(&self.runner, &self.config, self.tokens.as_ref()).await
            }
            BuiltinAction::EstablishGithubSession => {
                github::establish_session(&self.runner, &self.config).await
            }
            BuiltinAction::InstallAwsConfig => aws::install_config(&self.config),
        }
    }

    /// The one piece of output the user actually needs at the end: what to
    /// do next.
    fn print_banner(&self) {
        println!();
        println!("{GREEN}{BOLD}Environment ready.{RESET}");
        println!();
        println!("Next: open a new terminal so PATH changes load, then run:");
        println!("  cd {}", self.config.repo_dir().display());
        println!("  yarn dev");
        println!();
        println!("{DIM}Full output: {}{RESET}", self.log.path().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_propagate_the_failing_step() {
        let failed = BootstrapError::StepFailed {
            label: "Node.js",
            code: 7,
        };
        assert_eq!(failed.exit_code(), 7);
        assert_eq!(failed.to_string(), "step 'Node.js' failed (exit 7)");

        let zero_code = BootstrapError::StepFailed {
            label: "Yarn",
            code: 0,
        };
        assert_eq!(zero_code.exit_code(), 1);

        assert_eq!(BootstrapError::Interrupted.exit_code(), EXIT_INTERRUPTED);
        let other = BootstrapError::Other(anyhow::anyhow!("boom"));
        assert_eq!(other.exit_code(), 1);
    }
}
