//! Loader stub of bundled executables.
//!
//! `ego bundle` appends the runtime and the program to a copy of this binary.
//! At startup it unpacks them from its own executable and runs the program in
//! an enclave, forwarding its arguments.

use ego_core::{caller_env, install_interrupt_handler, run_bundle};
use ego_runtime::{remediation, OsRunner, SystemProbe};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("EGO_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("error: cannot locate own executable: {e}");
            return ExitCode::FAILURE;
        }
    };
    let args: Vec<String> = std::env::args().skip(1).collect();

    install_interrupt_handler();
    match run_bundle(&exe, &args, &caller_env(), &OsRunner) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            match e.failure_kind() {
                Some(kind) => eprintln!("{}", remediation(kind, &SystemProbe)),
                None => eprintln!("error: {e}"),
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
