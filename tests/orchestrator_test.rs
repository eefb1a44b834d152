// SPDX-License-Identifier: MIT
//! Orchestrator behavior: skip logic, criticality, keep-alive cleanup, and
//! credential provisioning, exercised end to end with throwaway plans.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use devup::config::BootstrapConfig;
use devup::orchestrator::{BootstrapError, Orchestrator};
use devup::probe::Probe;
use devup::prompt::{PromptError, TokenSource};
use devup::runner::EXIT_INTERRUPTED;
use devup::step::{BuiltinAction, CommandSpec, Criticality, Plan, Step, StepAction};

struct StaticTokens(&'static str);

impl TokenSource for StaticTokens {
    fn github_token(&self) -> Result<String, PromptError> {
        Ok(self.0.to_string())
    }
}

fn config_in(dir: &Path) -> BootstrapConfig {
    let config = BootstrapConfig {
        data_dir: dir.join("data"),
        home_dir: dir.to_path_buf(),
        workspace_dir: dir.join("dev"),
        repo_url: "git@github.com:acme-dev/monorepo.git".to_string(),
        ssh_key: dir.join(".ssh").join("id_ed25519"),
        brew_bin: "brew".to_string(),
        sudo_program: "true".to_string(),
    };
    config.ensure_data_dir().unwrap();
    config
}

/// A privilege step whose precondition always holds, so no real sudo runs.
fn skipped_privileges() -> Step {
    Step {
        label: "Administrator privileges",
        precondition: Probe::Command {
            program: "true".to_string(),
            args: vec![],
        },
        action: StepAction::Interactive(CommandSpec::new("true", &[])),
        criticality: Criticality::Fatal,
    }
}

fn plan_of(steps: Vec<Step>) -> Plan {
    Plan {
        privileges: skipped_privileges(),
        steps,
    }
}

fn shell_step(label: &'static str, script: String, criticality: Criticality) -> Step {
    Step {
        label,
        precondition: Probe::Never,
        action: StepAction::Command(CommandSpec::shell(script)),
        criticality,
    }
}

fn orchestrator(config: &BootstrapConfig, token: &'static str) -> Orchestrator {
    Orchestrator::new(
        config.clone(),
        Arc::new(StaticTokens(token)),
        CancellationToken::new(),
    )
}

// ─── Skip logic ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn satisfied_precondition_never_invokes_the_action() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let witness = dir.path().join("witness");

    let step = Step {
        label: "Already done",
        precondition: Probe::PathExists(dir.path().to_path_buf()),
        action: StepAction::Command(CommandSpec::shell(format!(
            "echo ran >> '{}'",
            witness.display()
        ))),
        criticality: Criticality::Fatal,
    };
    let plan = plan_of(vec![step]);

    orchestrator(&config, "t").run(&plan).await.unwrap();
    orchestrator(&config, "t").run(&plan).await.unwrap();
    assert!(!witness.exists(), "skipped step must not run its action");
}

#[tokio::test]
async fn second_run_repeats_no_side_effect() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let witness = dir.path().join("witness");

    let step = Step {
        label: "Create witness",
        precondition: Probe::PathExists(witness.clone()),
        action: StepAction::Command(CommandSpec::shell(format!(
            "echo once >> '{}'",
            witness.display()
        ))),
        criticality: Criticality::Fatal,
    };
    let plan = plan_of(vec![step]);

    let orch = orchestrator(&config, "t");
    orch.run(&plan).await.unwrap();
    orch.run(&plan).await.unwrap();

    let content = std::fs::read_to_string(&witness).unwrap();
    assert_eq!(content, "once\n");
}

#[tokio::test]
async fn rerun_repairs_a_partially_completed_step() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let engine = dir.path().join("engine");
    let role = dir.path().join("role");

    // First run leaves only the first artifact behind and fails.
    let script = format!(
        "if [ ! -f '{engine}' ]; then touch '{engine}'; exit 1; fi; touch '{role}'",
        engine = engine.display(),
        role = role.display(),
    );
    let step = Step {
        label: "Two artifacts",
        precondition: Probe::All(vec![
            Probe::PathExists(engine.clone()),
            Probe::PathExists(role.clone()),
        ]),
        action: StepAction::Command(CommandSpec::shell(script)),
        criticality: Criticality::Fatal,
    };
    let plan = plan_of(vec![step]);

    let err = orchestrator(&config, "t").run(&plan).await.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(engine.exists());
    assert!(!role.exists());

    orchestrator(&config, "t").run(&plan).await.unwrap();
    assert!(role.exists(), "rerun must finish the remaining effect");
}

// ─── Criticality ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn fatal_failure_aborts_with_the_step_status() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let witness = dir.path().join("later-step-ran");

    let plan = plan_of(vec![
        shell_step("Breaks", "exit 3".to_string(), Criticality::Fatal),
        shell_step(
            "Never reached",
            format!("touch '{}'", witness.display()),
            Criticality::Fatal,
        ),
    ]);

    let err = orchestrator(&config, "t").run(&plan).await.unwrap_err();
    match &err {
        BootstrapError::StepFailed { label, code } => {
            assert_eq!(*label, "Breaks");
            assert_eq!(*code, 3);
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 3);
    assert!(!witness.exists(), "steps after a fatal failure must not run");
}

#[tokio::test]
async fn advisory_failure_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let witness = dir.path().join("later-step-ran");

    let plan = plan_of(vec![
        shell_step("Best effort", "exit 5".to_string(), Criticality::Advisory),
        shell_step(
            "Still runs",
            format!("touch '{}'", witness.display()),
            Criticality::Fatal,
        ),
    ]);

    orchestrator(&config, "t").run(&plan).await.unwrap();
    assert!(witness.exists());
}

// ─── Keep-alive cleanup ──────────────────────────────────────────────────────

#[tokio::test]
async fn keepalive_marker_lives_for_the_run_then_disappears() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let marker = config.keepalive_marker();

    // The step itself observes the marker mid-run.
    let plan = plan_of(vec![shell_step(
        "Marker visible",
        format!("test -f '{}'", marker.display()),
        Criticality::Fatal,
    )]);

    orchestrator(&config, "t").run(&plan).await.unwrap();
    assert!(!marker.exists(), "marker must not survive the run");
}

#[tokio::test]
async fn keepalive_marker_is_removed_even_after_a_fatal_abort() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let marker = config.keepalive_marker();

    let plan = plan_of(vec![shell_step(
        "Breaks",
        "exit 9".to_string(),
        Criticality::Fatal,
    )]);

    let err = orchestrator(&config, "t").run(&plan).await.unwrap_err();
    assert_eq!(err.exit_code(), 9);
    assert!(!marker.exists(), "marker must be cleaned up on abort");
}

#[tokio::test]
async fn cancelled_run_reports_interrupt_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let witness = dir.path().join("step-ran");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let orch = Orchestrator::new(config.clone(), Arc::new(StaticTokens("t")), cancel);

    let plan = plan_of(vec![shell_step(
        "Would run",
        format!("touch '{}'", witness.display()),
        Criticality::Fatal,
    )]);

    let err = orch.run(&plan).await.unwrap_err();
    assert!(matches!(err, BootstrapError::Interrupted));
    assert_eq!(err.exit_code(), EXIT_INTERRUPTED);
    assert!(!witness.exists());
    assert!(!config.keepalive_marker().exists());
}

// ─── Credential provisioning ─────────────────────────────────────────────────

fn provision_plan() -> Plan {
    plan_of(vec![Step {
        label: "GitHub credentials",
        precondition: Probe::Never,
        action: StepAction::Builtin(BuiltinAction::ProvisionGithubAuth),
        criticality: Criticality::Fatal,
    }])
}

#[tokio::test]
async fn empty_credential_aborts_and_writes_no_token() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let err = orchestrator(&config, "   ")
        .run(&provision_plan())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("github token"));
    assert!(!config.token_file().exists(), "no token file may be written");
    assert!(!config.keepalive_marker().exists());
}

#[tokio::test]
async fn provisioning_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    // Pre-seed the key pair so no real ssh-keygen run is needed.
    std::fs::create_dir_all(config.ssh_dir()).unwrap();
    std::fs::write(&config.ssh_key, "fake private key\n").unwrap();

    let orch = orchestrator(&config, "ghp_test_123");
    orch.run(&provision_plan()).await.unwrap();
    orch.run(&provision_plan()).await.unwrap();

    let token = std::fs::read_to_string(config.token_file()).unwrap();
    assert_eq!(token, "ghp_test_123");
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(config.token_file())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let ssh_config = std::fs::read_to_string(config.ssh_config()).unwrap();
    assert!(ssh_config.contains("Host github.com"));
    assert_eq!(
        ssh_config.matches("# >>> devup github-ssh >>>").count(),
        1,
        "managed block must not duplicate on rerun"
    );
}
