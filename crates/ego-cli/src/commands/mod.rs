pub mod bundle;
pub mod completions;
pub mod env;
pub mod install;
pub mod man_pages;
pub mod marblerun;
pub mod run;
pub mod sign;
pub mod signerid;
pub mod uniqueid;

use clap::CommandFactory;
use ego_core::CoreError;
use ego_runtime::{remediation, SystemProbe};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE: u8 = 2;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, &format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, &format!("✗ {msg}"));
}

fn finish(pb: &ProgressBar, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg.to_owned());
}

/// Convert a process exit code to what `ExitCode` can carry.
pub fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_FAILURE)
}

/// Print `err` for the operator and return the exit code to use.
///
/// Classified failures get their remediation text; launch failures print
/// only that, other classified errors print the error line first.
pub fn report_failure(err: &CoreError) -> u8 {
    match err.failure_kind() {
        Some(kind) => {
            if !matches!(err, CoreError::Runtime(_)) {
                eprintln!("error: {err}");
            }
            eprintln!("{}", remediation(kind, &SystemProbe));
        }
        None => eprintln!("error: {err}"),
    }
    exit_code(err.exit_code())
}

/// Print the long help of subcommand `name` to stderr.
pub fn print_usage<C: CommandFactory>(name: &str) {
    let mut cmd = C::command();
    if let Some(sub) = cmd.find_subcommand_mut(name) {
        let mut sub = sub.clone().bin_name(format!("ego {name}"));
        eprintln!("\n{}", sub.render_long_help());
    }
}
