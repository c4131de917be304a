use super::{exit_code, report_failure};
use ego_core::{install_interrupt_handler, interrupted, Engine};
use std::path::Path;
use tracing::debug;

pub fn run(engine: &Engine, program: &Path, args: &[String]) -> Result<u8, String> {
    install_interrupt_handler();
    match engine.run(program, args) {
        Ok(code) => {
            if interrupted() {
                debug!("enclave exited with {code} after interrupt");
            }
            Ok(exit_code(code))
        }
        Err(e) => Ok(report_failure(&e)),
    }
}
