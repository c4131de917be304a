//! Classification of enclave launch failures.
//!
//! The host runtime reports initialization failures on stderr. Each
//! [`FailureKind`] owns exactly one marker substring and one remediation; the
//! markers never overlap, so a failed launch maps to at most one kind.

use crate::probe::{HostProbe, ISGX_DEVICE, SGX_ENCLAVE_DEVICE};
use crate::runner::ProcessExit;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    MissingMetadata,
    NotPositionIndependent,
    InvalidInitialAttributes,
    InvalidMeasurement,
    UnexpectedInitFailure,
    DeviceOpenFailure,
    DataLoadFailure,
    SigningCryptoFailure,
}

impl FailureKind {
    pub const ALL: [Self; 8] = [
        Self::MissingMetadata,
        Self::NotPositionIndependent,
        Self::InvalidInitialAttributes,
        Self::InvalidMeasurement,
        Self::UnexpectedInitFailure,
        Self::DeviceOpenFailure,
        Self::DataLoadFailure,
        Self::SigningCryptoFailure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::MissingMetadata => "missing-metadata",
            Self::NotPositionIndependent => "binary-not-position-independent",
            Self::InvalidInitialAttributes => "invalid-initial-attributes",
            Self::InvalidMeasurement => "invalid-measurement",
            Self::UnexpectedInitFailure => "unexpected-init-failure",
            Self::DeviceOpenFailure => "isolation-device-open-failure",
            Self::DataLoadFailure => "data-load-failure",
            Self::SigningCryptoFailure => "signing-crypto-failure",
        }
    }

    /// Substring the host runtime writes to stderr for this failure.
    pub fn marker(self) -> &'static str {
        match self {
            Self::MissingMetadata => ".oeinfo section not found",
            Self::NotPositionIndependent => "ELF image is not a PIE or shared object",
            Self::InvalidInitialAttributes => "oe_sgx_is_valid_attributes failed: Attributes = 0",
            Self::InvalidMeasurement => "enclave_initialize failed (err=0x4)",
            Self::UnexpectedInitFailure => "enclave_initialize failed (err=0x1001)",
            Self::DeviceOpenFailure => "Failed to open Intel SGX device",
            Self::DataLoadFailure => "oe_sgx_load_enclave_data failed (err=0x1001)",
            Self::SigningCryptoFailure => "OE_CRYPTO_ERROR",
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            Self::MissingMetadata
            | Self::NotPositionIndependent
            | Self::InvalidInitialAttributes => "failed to load the binary",
            Self::InvalidMeasurement | Self::UnexpectedInitFailure | Self::DataLoadFailure => {
                "failed to initialize the enclave"
            }
            Self::DeviceOpenFailure => "failed to open Intel SGX device",
            Self::SigningCryptoFailure => "failed with OE_CRYPTO_ERROR",
        }
    }

    fn matches(self, line: &str) -> bool {
        line.contains(self.marker())
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.headline(), self.name())
    }
}

/// Kind of a failed launch, or `None` if the host succeeded or printed no known marker.
pub fn classify(exit: &ProcessExit) -> Option<FailureKind> {
    if exit.success() {
        return None;
    }
    exit.stderr_tail
        .iter()
        .find_map(|line| FailureKind::ALL.into_iter().find(|k| k.matches(line)))
}

/// What to tell the operator about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub headline: &'static str,
    pub hints: Vec<String>,
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}", self.headline)?;
        for hint in &self.hints {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

/// Remediation for `kind`. Driver-related kinds consult `probe`; the result is
/// a hint, not a diagnosis.
pub fn remediation(kind: FailureKind, probe: &dyn HostProbe) -> Remediation {
    let hints: Vec<String> = match kind {
        FailureKind::MissingMetadata => vec![
            "The binary doesn't contain enclave signing metadata.".to_owned(),
            "Sign it with 'ego sign' before running it.".to_owned(),
        ],
        FailureKind::NotPositionIndependent => {
            vec!["The binary doesn't seem to be built with 'ego-go build'".to_owned()]
        }
        FailureKind::InvalidInitialAttributes => {
            vec!["Please sign the binary with 'ego sign'".to_owned()]
        }
        FailureKind::InvalidMeasurement => {
            vec!["Try to resign the binary with 'ego sign' and rerun afterwards.".to_owned()]
        }
        FailureKind::UnexpectedInitFailure => {
            if probe.path_exists(Path::new(ISGX_DEVICE)) {
                vec!["Try to run: sudo ego install libsgx-launch".to_owned()]
            } else {
                Vec::new()
            }
        }
        FailureKind::DeviceOpenFailure => {
            let mut hints = Vec::new();
            if probe.cpu_supports_sgx() {
                // The device also fails to open when only the in-kernel node exists
                // without the legacy symlinks; the base package creates them.
                if probe.path_exists(Path::new(SGX_ENCLAVE_DEVICE)) {
                    hints.push(
                        "Install the SGX base package with: sudo ego install libsgx-enclave-common"
                            .to_owned(),
                    );
                } else {
                    hints.push("Install the SGX driver with: sudo ego install sgx-driver".to_owned());
                }
            } else {
                hints.push("This machine doesn't support SGX.".to_owned());
            }
            hints.push(
                "You can use 'OE_SIMULATION=1 ego run ...' to run in simulation mode.".to_owned(),
            );
            hints
        }
        FailureKind::DataLoadFailure => vec![
            "Install the SGX base package with: sudo ego install libsgx-enclave-common".to_owned(),
            "Or temporarily fix the error with: sudo mount -o remount,exec /dev".to_owned(),
        ],
        FailureKind::SigningCryptoFailure => {
            vec!["Make sure to pass a valid public key or signed executable.".to_owned()]
        }
    };
    Remediation {
        headline: kind.headline(),
        hints,
    }
}
