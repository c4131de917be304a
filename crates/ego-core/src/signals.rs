use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

static INTERRUPTS: AtomicUsize = AtomicUsize::new(0);

/// Keep the CLI alive through the first interrupt.
///
/// The terminal delivers SIGINT to the whole foreground process group, so a
/// running host process receives it directly and its exit code is still
/// collected. A second interrupt exits immediately with 130.
///
/// Returns whether the handler was installed. Only one handler can exist per
/// process; later calls leave the first one in place.
pub fn install_interrupt_handler() -> bool {
    let installed = ctrlc::set_handler(move || {
        if INTERRUPTS.fetch_add(1, Ordering::SeqCst) > 0 {
            std::process::exit(130);
        }
        eprintln!("\ninterrupt received, waiting for the enclave to exit...");
    });
    if let Err(e) = installed {
        debug!("interrupt handler not installed: {e}");
        return false;
    }
    true
}

pub fn interrupted() -> bool {
    INTERRUPTS.load(Ordering::SeqCst) > 0
}
