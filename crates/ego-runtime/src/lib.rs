//! Launch orchestration and runtime integration for EGo enclaves.
//!
//! This crate implements the execution layer: the `ProcessRunner` seam with an
//! OS-backed and a mock implementation, the environment propagation filter
//! that decides what the enclave may see, the standalone and Marblerun launch
//! paths, classification of host-side initialization failures into
//! `FailureKind`s with remediation hints, best-effort host probes, and the
//! driver/runtime component installer.

pub mod classify;
pub mod env;
pub mod install;
pub mod launch;
pub mod layout;
pub mod mock;
pub mod probe;
pub mod runner;

pub use classify::{classify, remediation, FailureKind, Remediation};
pub use env::{propagated_env, ENCLAVE_ENV_PREFIX, SIMULATION_VAR};
pub use install::{Catalogue, Component, OsInfo};
pub use launch::{run_enclave, run_enclave_marblerun, MARBLE_ENV};
pub use layout::RuntimeLayout;
pub use mock::MockRunner;
pub use probe::{HostProbe, StaticProbe, SystemProbe};
pub use runner::{Invocation, OsRunner, ProcessExit, ProcessRunner};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime installation not found: {} is missing", .0.display())]
    InstallationNotFound(PathBuf),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{kind}")]
    Classified { kind: FailureKind, exit_code: i32 },
    #[error("environment variable {0} must be set to run as a Marblerun Marble")]
    MissingMarbleEnv(&'static str),
    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),
    #[error("unknown component '{name}' (available: {available})")]
    UnknownComponent { name: String, available: String },
    #[error("installation step failed with exit code {code}: {command}")]
    InstallStepFailed { command: String, code: i32 },
    #[error("invalid component catalogue: {0}")]
    Catalogue(#[from] toml::de::Error),
}

impl RuntimeError {
    /// Missing files are reported with usage text by the CLI.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
