use super::{exit_code, print_usage, report_failure, EXIT_USAGE};
use clap::CommandFactory;
use ego_core::{install_interrupt_handler, CoreError, Engine};
use ego_runtime::RuntimeError;
use std::path::Path;

pub fn run<C: CommandFactory>(engine: &Engine, program: &Path) -> Result<u8, String> {
    install_interrupt_handler();
    match engine.marblerun(program) {
        Ok(code) => Ok(exit_code(code)),
        Err(e @ CoreError::Runtime(RuntimeError::MissingMarbleEnv(_))) => {
            eprintln!("error: {e}");
            print_usage::<C>("marblerun");
            Ok(EXIT_USAGE)
        }
        Err(e) => Ok(report_failure(&e)),
    }
}
