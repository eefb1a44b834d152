//! The bootstrap sequence.
//!
//! One fixed, ordered list. Order carries real dependencies (the GitHub
//! session needs the token, the clone needs the session, everything after
//! the clone lives inside the checkout), so steps only ever assume that
//! earlier artifacts exist, never that a later step will patch things up.
//!
//! Each precondition covers every artifact its action leaves behind; a rerun
//! after a partial failure resumes at the unfinished step.

use std::path::PathBuf;

use crate::config::BootstrapConfig;
use crate::github;
use crate::homebrew;
use crate::probe::Probe;
use crate::shellrc;
use crate::step::{BuiltinAction, CommandSpec, Criticality, Plan, Step, StepAction};

/// Build the full sequence against the resolved configuration.
pub fn bootstrap_plan(config: &BootstrapConfig) -> Plan {
    let repo_dir = config.repo_dir();

    let privileges = Step {
        label: "Administrator privileges",
        precondition: Probe::Command {
            program: config.sudo_program.clone(),
            args: vec!["-n".into(), "-v".into()],
        },
        action: StepAction::Interactive(CommandSpec::new(&config.sudo_program, &["-v"])),
        criticality: Criticality::Fatal,
    };

    let steps = vec![
        Step {
            label: "Homebrew",
            precondition: Probe::All(vec![
                Probe::Any(vec![
                    Probe::Binary("brew"),
                    Probe::PathExists(PathBuf::from(&config.brew_bin)),
                ]),
                Probe::FileContains(
                    config.shell_profile(),
                    shellrc::begin_marker(homebrew::PROFILE_BLOCK),
                ),
            ]),
            action: StepAction::Builtin(BuiltinAction::InstallHomebrew),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "GitHub CLI",
            precondition: Probe::Binary("gh"),
            action: StepAction::Command(CommandSpec::new("brew", &["install", "gh"])),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "GitHub credentials",
            precondition: Probe::All(vec![
                Probe::PathExists(config.token_file()),
                Probe::PathExists(config.ssh_key.clone()),
                Probe::FileContains(
                    config.ssh_config(),
                    shellrc::begin_marker(github::SSH_CONFIG_BLOCK),
                ),
            ]),
            action: StepAction::Builtin(BuiltinAction::ProvisionGithubAuth),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "GitHub session",
            precondition: Probe::Command {
                program: "gh".into(),
                args: vec!["auth".into(), "status".into()],
            },
            action: StepAction::Builtin(BuiltinAction::EstablishGithubSession),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Monorepo checkout",
            precondition: Probe::PathExists(repo_dir.clone()),
            action: StepAction::Command(CommandSpec::shell(format!(
                "mkdir -p '{}' && git clone '{}' '{}'",
                config.workspace_dir.display(),
                config.repo_url,
                repo_dir.display(),
            ))),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Node.js",
            precondition: Probe::Binary("node"),
            action: StepAction::Command(CommandSpec::new("brew", &["install", "node"])),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Yarn",
            precondition: Probe::Binary("yarn"),
            action: StepAction::Command(CommandSpec::new("brew", &["install", "yarn"])),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "AWS CLI",
            precondition: Probe::Binary("aws"),
            action: StepAction::Command(CommandSpec::new("brew", &["install", "awscli"])),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "AWS SSO session",
            precondition: Probe::Command {
                program: "aws".into(),
                args: vec!["sts".into(), "get-caller-identity".into()],
            },
            action: StepAction::Interactive(CommandSpec::new("aws", &["sso", "login"])),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "AWS config",
            precondition: Probe::PathExists(config.aws_config()),
            action: StepAction::Builtin(BuiltinAction::InstallAwsConfig),
            criticality: Criticality::Fatal,
        },
        // yarn and git track their own incremental state from here on.
        Step {
            label: "Project dependencies",
            precondition: Probe::Never,
            action: StepAction::Command(
                CommandSpec::new("yarn", &["install"]).cwd(repo_dir.clone()),
            ),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Git submodules",
            precondition: Probe::Never,
            action: StepAction::Command(
                CommandSpec::new("git", &["submodule", "update", "--init", "--recursive"])
                    .cwd(repo_dir.clone()),
            ),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Project build",
            precondition: Probe::Never,
            action: StepAction::Command(CommandSpec::new("yarn", &["build"]).cwd(repo_dir.clone())),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Docker",
            precondition: Probe::Binary("docker"),
            action: StepAction::Command(CommandSpec::new(
                "brew",
                &["install", "--cask", "docker"],
            )),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Environment secrets",
            precondition: Probe::PathExists(repo_dir.join(".env")),
            action: StepAction::Command(
                CommandSpec::new("yarn", &["run", "secrets:pull"]).cwd(repo_dir.clone()),
            ),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "PostgreSQL",
            // The role can be missing with the engine installed; probe both.
            precondition: Probe::All(vec![
                Probe::Binary("psql"),
                Probe::Command {
                    program: "psql".into(),
                    args: vec![
                        "-U".into(),
                        "postgres".into(),
                        "-d".into(),
                        "postgres".into(),
                        "-tAc".into(),
                        "select 1".into(),
                    ],
                },
            ]),
            action: StepAction::Command(CommandSpec::shell(
                "brew install postgresql@16 && brew services start postgresql@16 && \
                 { i=0; until pg_isready -q || [ $i -ge 30 ]; do i=$((i+1)); sleep 1; done; \
                 createuser -s postgres || psql -U postgres -d postgres -c 'select 1' >/dev/null; }",
            )),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "Database migrations",
            precondition: Probe::Never,
            action: StepAction::Command(
                CommandSpec::new("yarn", &["run", "db:migrate"]).cwd(repo_dir),
            ),
            criticality: Criticality::Fatal,
        },
        Step {
            label: "1Password",
            precondition: Probe::Command {
                program: "brew".into(),
                args: vec!["list".into(), "--cask".into(), "1password".into()],
            },
            action: StepAction::Command(CommandSpec::new(
                "brew",
                &["install", "--cask", "1password"],
            )),
            criticality: Criticality::Advisory,
        },
    ];

    Plan { privileges, steps }
}
