//! Standalone and Marblerun enclave launches.
//!
//! Both paths start `ego-host <enclave-loader> <program> [args...]` with the
//! filtered environment and block until the host exits. Each call is an
//! independent launch; nothing is kept between calls.

use crate::classify::{classify, FailureKind};
use crate::env::{propagated_env, simulation_requested, PREMAIN_VAR};
use crate::runner::{Invocation, ProcessRunner};
use crate::RuntimeError;
use ego_schema::SectionState;
use std::path::Path;
use tracing::{debug, info};

/// Variables a Marble needs before it can talk to the Coordinator.
pub const MARBLE_ENV: [&str; 4] = [
    "EDG_MARBLE_COORDINATOR_ADDR",
    "EDG_MARBLE_TYPE",
    "EDG_MARBLE_DNS_NAMES",
    "EDG_MARBLE_UUID_FILE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Premain {
    Standalone,
    Marblerun,
}

impl Premain {
    fn value(self) -> &'static str {
        match self {
            Self::Standalone => "0",
            Self::Marblerun => "1",
        }
    }
}

/// Run a signed program in standalone mode and return its exit code.
///
/// `env` is the caller's complete environment; only the propagation set
/// reaches the host process.
pub fn run_enclave(
    program: &Path,
    args: &[String],
    host: &Path,
    enclave: &Path,
    env: &[(String, String)],
    runner: &dyn ProcessRunner,
) -> Result<i32, RuntimeError> {
    require_signed(program)?;
    launch(program, args, host, enclave, env, Premain::Standalone, runner)
}

/// Run a signed program as a Marblerun Marble and return its exit code.
pub fn run_enclave_marblerun(
    program: &Path,
    host: &Path,
    enclave: &Path,
    env: &[(String, String)],
    runner: &dyn ProcessRunner,
) -> Result<i32, RuntimeError> {
    for name in MARBLE_ENV {
        let present = env.iter().any(|(k, v)| k == name && !v.is_empty());
        if !present {
            return Err(RuntimeError::MissingMarbleEnv(name));
        }
    }
    require_signed(program)?;
    launch(program, &[], host, enclave, env, Premain::Marblerun, runner)
}

fn require_signed(program: &Path) -> Result<(), RuntimeError> {
    let bytes = std::fs::read(program)?;
    let kind = match ego_schema::inspect(&bytes) {
        Ok(SectionState::Signed { section, .. }) if section.properties.attributes == 0 => {
            FailureKind::InvalidInitialAttributes
        }
        Ok(SectionState::Signed { .. }) => match ego_schema::verify_program(&bytes) {
            Ok(_) => return Ok(()),
            Err(e) => {
                debug!("signature check of {} failed: {e}", program.display());
                FailureKind::InvalidMeasurement
            }
        },
        Ok(SectionState::Absent | SectionState::Placeholder { .. }) | Err(_) => {
            FailureKind::MissingMetadata
        }
    };
    debug!("refusing to launch {}: {kind}", program.display());
    Err(RuntimeError::Classified { kind, exit_code: 1 })
}

fn launch(
    program: &Path,
    args: &[String],
    host: &Path,
    enclave: &Path,
    env: &[(String, String)],
    premain: Premain,
    runner: &dyn ProcessRunner,
) -> Result<i32, RuntimeError> {
    let mut vars = propagated_env(env.iter().cloned());
    vars.push((PREMAIN_VAR.to_owned(), premain.value().to_owned()));
    if simulation_requested(&vars) {
        info!("running in simulation mode");
    }

    let mut argv = vec![
        enclave.display().to_string(),
        program.display().to_string(),
    ];
    argv.extend(args.iter().cloned());

    let invocation = Invocation {
        program: host.to_path_buf(),
        args: argv,
        env: vars,
    };
    let exit = runner.run(&invocation)?;

    if let Some(kind) = classify(&exit) {
        return Err(RuntimeError::Classified {
            kind,
            exit_code: exit.code,
        });
    }
    Ok(exit.code)
}
