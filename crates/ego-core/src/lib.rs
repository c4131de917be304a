//! Core engine for EGo: signing, identity extraction, launching, bundling and installation.
//!
//! This crate ties the signing schema and the runtime integration together into
//! the `Engine`, the API the `ego` CLI drives. It also owns the self-contained
//! bundle format, atomic file replacement, and interrupt handling around
//! launched host processes.

pub mod bundle;
pub mod engine;
mod fsutil;
pub mod signals;
pub mod signer;

pub use bundle::{extract_payload, run_bundle, unpack_payload, BundleContents, BUNDLE_SUFFIX};
pub use engine::{caller_env, BundleResult, Engine, InstallOutcome};
pub use signals::{install_interrupt_handler, interrupted};
pub use signer::{SignResult, SignTarget};

use ego_runtime::{FailureKind, RuntimeError};
use ego_schema::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no program specified and no enclave.json in the current directory")]
    NoProgram,
    #[error("{} already configures a different executable ({exe})", config.display())]
    ConfigConflict { config: PathBuf, exe: String },
    #[error("{} is neither a signed executable nor a valid key: {reason}", path.display())]
    InvalidIdentityInput { path: PathBuf, reason: String },
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),
}

impl CoreError {
    /// Whether the error is a missing input file; the CLI adds usage text for these.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) | Self::Schema(SchemaError::Io(e)) => {
                e.kind() == std::io::ErrorKind::NotFound
            }
            Self::Runtime(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// The classified failure behind this error, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Runtime(RuntimeError::Classified { kind, .. }) => Some(*kind),
            Self::InvalidIdentityInput { .. } => Some(FailureKind::SigningCryptoFailure),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Runtime(RuntimeError::Classified { exit_code, .. }) if *exit_code != 0 => {
                *exit_code
            }
            Self::Runtime(RuntimeError::MissingMarbleEnv(_)) | Self::NoProgram => 2,
            _ => 1,
        }
    }
}
