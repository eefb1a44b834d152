// SPDX-License-Identifier: MIT
//! devup doctor: report which bootstrap steps would run, without running any.
//!
//! Every row is a step's precondition evaluated as-is. Probes are read-only,
//! so the doctor is safe on any machine in any state.

use serde::Serialize;

use crate::config::BootstrapConfig;
use crate::plan::bootstrap_plan;
use crate::step::Step;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// One row of the doctor report.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub satisfied: bool,
    pub detail: String,
}

/// Evaluate every step's precondition plus the data-directory check.
pub fn run_checks(config: &BootstrapConfig) -> Vec<CheckReport> {
    let plan = bootstrap_plan(config);
    let mut reports = vec![check_data_dir(config)];
    reports.push(check_step(&plan.privileges));
    reports.extend(plan.steps.iter().map(check_step));
    reports
}

fn check_step(step: &Step) -> CheckReport {
    CheckReport {
        name: step.label.to_string(),
        satisfied: step.precondition.satisfied(),
        detail: step.precondition.describe(),
    }
}

fn check_data_dir(config: &BootstrapConfig) -> CheckReport {
    let dir = &config.data_dir;
    let (satisfied, detail) = if dir.is_dir() {
        (true, format!("present at {}", dir.display()))
    } else {
        match dir.ancestors().find(|a| a.exists()) {
            Some(base) if base.is_dir() => {
                (false, format!("will be created under {}", base.display()))
            }
            _ => (false, format!("{} is blocked by a non-directory", dir.display())),
        }
    };
    CheckReport {
        name: "Data directory".to_string(),
        satisfied,
        detail,
    }
}

pub fn print_report(reports: &[CheckReport]) {
    println!();
    println!("{BOLD}devup doctor{RESET}");
    println!("{}", "─".repeat(72));

    for report in reports {
        let (symbol, color) = if report.satisfied {
            ("✓", GREEN)
        } else {
            ("✗", RED)
        };
        println!(
            "  {color}{symbol}{RESET}  {:<26}  {}",
            report.name, report.detail
        );
    }

    println!("{}", "─".repeat(72));

    let pending = reports.iter().filter(|r| !r.satisfied).count();
    if pending == 0 {
        println!("{GREEN}Everything is already in place.{RESET}");
    } else {
        println!("{pending} step(s) not satisfied yet; `devup` will run them.");
    }
    println!();
}

/// True when no step would run.
pub fn all_satisfied(reports: &[CheckReport]) -> bool {
    reports.iter().all(|r| r.satisfied)
}
