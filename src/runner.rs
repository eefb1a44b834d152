// SPDX-License-Identifier: MIT
//! Step execution: spawn a child, stream its output into the session log,
//! render a spinner while it runs, and print exactly one status line when it
//! finishes.
//!
//! The terminal contract is strict. While a captured command runs, the only
//! thing on screen is the spinner; when it stops (success, failure, spawn
//! error, cancellation) the spinner is cleared before anything else is
//! printed, so no partial spinner frame is ever left behind.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::BootstrapConfig;
use crate::session_log::SessionLog;
use crate::step::CommandSpec;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Lines of child output kept as the report excerpt.
pub const EXCERPT_LINES: usize = 10;

/// Synthetic exit code when the command could not be spawned at all
/// (shell convention for "command not found").
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Exit code reported for a cancelled step (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

// ─── Reports ──────────────────────────────────────────────────────────────────

/// Outcome of one executed step action.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub label: String,
    pub exit_code: i32,
    pub duration: Duration,
    /// Tail of the child's output, for error messages. The full stream is in
    /// the session log.
    pub log_excerpt: Vec<String>,
}

/// Exit code and output tail of a captured child.
#[derive(Debug)]
pub struct Captured {
    pub code: i32,
    pub tail: Vec<String>,
}

// ─── StepRunner ───────────────────────────────────────────────────────────────

/// Executes step actions against one session log and one cancellation token.
pub struct StepRunner {
    child_path: OsString,
    log: Arc<SessionLog>,
    cancel: CancellationToken,
}

impl StepRunner {
    pub fn new(config: &BootstrapConfig, log: Arc<SessionLog>, cancel: CancellationToken) -> Self {
        Self {
            child_path: config.child_path(),
            log,
            cancel,
        }
    }

    pub fn session_log(&self) -> &Arc<SessionLog> {
        &self.log
    }

    /// Run a captured command behind a spinner.
    pub async fn run_command(&self, label: &str, spec: &CommandSpec) -> Result<StepReport> {
        let started = Instant::now();
        self.log.begin_step(label).await;
        let spinner = self.spinner(label);
        let outcome = self.capture(spec).await;
        spinner.finish_and_clear();
        let captured = outcome?;
        println!("{}", status_line(label, captured.code));
        Ok(StepReport {
            label: label.to_string(),
            exit_code: captured.code,
            duration: started.elapsed(),
            log_excerpt: captured.tail,
        })
    }

    /// Run a terminal-attached command (password prompts, browser hand-offs).
    /// No spinner and no capture; the session log records the step header and
    /// the exit status only.
    pub async fn run_interactive(&self, label: &str, spec: &CommandSpec) -> Result<StepReport> {
        let started = Instant::now();
        self.log.begin_step(label).await;
        println!("{DIM}→ {label}{RESET}");

        let mut command = self.base_command(spec);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let line = format!("failed to start `{}`: {err}", spec.display());
                self.log.append_line(&line).await;
                println!("{}", status_line(label, EXIT_SPAWN_FAILED));
                return Ok(StepReport {
                    label: label.to_string(),
                    exit_code: EXIT_SPAWN_FAILED,
                    duration: started.elapsed(),
                    log_excerpt: vec![line],
                });
            }
        };

        let code = tokio::select! {
            status = child.wait() => {
                status.with_context(|| format!("failed to wait for `{}`", spec.display()))?
                    .code()
                    .unwrap_or(-1)
            }
            _ = self.cancel.cancelled() => {
                child.kill().await.ok();
                EXIT_INTERRUPTED
            }
        };

        self.log.append_line(&format!("exit {code}")).await;
        println!("{}", status_line(label, code));
        Ok(StepReport {
            label: label.to_string(),
            exit_code: code,
            duration: started.elapsed(),
            log_excerpt: Vec::new(),
        })
    }

    /// Drive an in-process action under the same terminal contract as an
    /// external command: spinner (unless the action prompts), then exactly
    /// one status line.
    pub async fn run_builtin<F>(&self, label: &str, interactive: bool, action: F) -> Result<StepReport>
    where
        F: Future<Output = Result<i32>>,
    {
        let started = Instant::now();
        self.log.begin_step(label).await;
        let spinner = if interactive {
            println!("{DIM}→ {label}{RESET}");
            None
        } else {
            Some(self.spinner(label))
        };

        let outcome = action.await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        match outcome {
            Ok(code) => {
                println!("{}", status_line(label, code));
                Ok(StepReport {
                    label: label.to_string(),
                    exit_code: code,
                    duration: started.elapsed(),
                    log_excerpt: Vec::new(),
                })
            }
            Err(err) => {
                self.log.append_line(&format!("{label} failed: {err:#}")).await;
                println!("{RED}✗{RESET} {label} (failed)");
                Err(err)
            }
        }
    }

    /// Spawn `spec` with stdout and stderr piped line-by-line into the
    /// session log. Spawn failure is not an error: it yields a synthetic
    /// exit code of [`EXIT_SPAWN_FAILED`] so the caller can treat "command
    /// missing" like any other failing step.
    pub async fn capture(&self, spec: &CommandSpec) -> Result<Captured> {
        self.log.append_line(&format!("$ {}", spec.display())).await;

        let mut command = self.base_command(spec);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        command.stdin(match &spec.stdin_file {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                Stdio::from(file)
            }
            None => Stdio::null(),
        });

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let line = format!("failed to start `{}`: {err}", spec.display());
                self.log.append_line(&line).await;
                return Ok(Captured {
                    code: EXIT_SPAWN_FAILED,
                    tail: vec![line],
                });
            }
        };

        let mut stdout = child
            .stdout
            .take()
            .map(|out| BufReader::new(out).lines())
            .context("child stdout not piped")?;
        let mut stderr = child
            .stderr
            .take()
            .map(|err| BufReader::new(err).lines())
            .context("child stderr not piped")?;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(EXCERPT_LINES);
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut interrupted = false;

        // Drain both pipes until they close. A kill closes them, so the loop
        // also terminates on cancellation.
        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => {
                        self.log.append_line(&line).await;
                        push_tail(&mut tail, line);
                    }
                    _ => stdout_done = true,
                },
                line = stderr.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => {
                        self.log.append_line(&line).await;
                        push_tail(&mut tail, line);
                    }
                    _ => stderr_done = true,
                },
                _ = self.cancel.cancelled(), if !interrupted => {
                    child.kill().await.ok();
                    interrupted = true;
                }
            }
        }

        let status = if interrupted {
            child
                .wait()
                .await
                .with_context(|| format!("failed to wait for `{}`", spec.display()))?
        } else {
            // The child can close its pipes and keep running; stay
            // cancellable while reaping it.
            tokio::select! {
                status = child.wait() => {
                    status.with_context(|| format!("failed to wait for `{}`", spec.display()))?
                }
                _ = self.cancel.cancelled() => {
                    child.kill().await.ok();
                    interrupted = true;
                    child
                        .wait()
                        .await
                        .with_context(|| format!("failed to wait for `{}`", spec.display()))?
                }
            }
        };

        let code = if interrupted {
            EXIT_INTERRUPTED
        } else {
            status.code().unwrap_or(-1)
        };
        self.log.append_line(&format!("exit {code}")).await;
        Ok(Captured {
            code,
            tail: tail.into(),
        })
    }

    fn base_command(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        // Tools installed earlier in this run (brew, everything under its
        // prefix) must resolve without a shell reload.
        command.env("PATH", &self.child_path);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        command.kill_on_drop(true);
        command
    }

    fn spinner(&self, label: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        spinner.set_message(label.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == EXCERPT_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

/// The one line a finished step leaves on the terminal.
pub fn status_line(label: &str, exit_code: i32) -> String {
    if exit_code == 0 {
        format!("{GREEN}✓{RESET} {label}")
    } else {
        format!("{RED}✗{RESET} {label} (exit {exit_code})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_marks_success_and_failure() {
        assert_eq!(status_line("Homebrew", 0), "\x1b[32m✓\x1b[0m Homebrew");
        assert_eq!(status_line("Node.js", 7), "\x1b[31m✗\x1b[0m Node.js (exit 7)");
    }

    #[test]
    fn tail_keeps_only_the_last_lines() {
        let mut tail = VecDeque::new();
        for i in 0..25 {
            push_tail(&mut tail, format!("line {i}"));
        }
        assert_eq!(tail.len(), EXCERPT_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("line 15"));
        assert_eq!(tail.back().map(String::as_str), Some("line 24"));
    }
}
