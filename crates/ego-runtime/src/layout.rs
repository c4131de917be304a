use crate::RuntimeError;
use std::path::{Path, PathBuf};

const FALLBACK_ROOT: &str = "/opt/ego";

/// Directory layout of an installed runtime.
///
/// ```text
/// <root>/bin/ego-host        host binary, creates and supervises the enclave
/// <root>/share/ego-enclave   loader executed inside the enclave
/// <root>/share/ego-bundle    loader stub for bundled executables
/// <root>/go                  toolchain used by `ego env`
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    root: PathBuf,
}

impl RuntimeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout for the installation the given `ego` executable lives in (`<root>/bin/ego`).
    pub fn from_executable(exe: &Path) -> Option<Self> {
        exe.parent()?.parent().map(Self::new)
    }

    /// Layout of the running executable's installation, or `/opt/ego`.
    pub fn discover() -> Self {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.canonicalize().ok())
            .and_then(|exe| Self::from_executable(&exe))
            .unwrap_or_else(|| Self::new(FALLBACK_ROOT))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn host_binary(&self) -> PathBuf {
        self.root.join("bin").join("ego-host")
    }

    pub fn enclave_binary(&self) -> PathBuf {
        self.root.join("share").join("ego-enclave")
    }

    pub fn bundle_loader(&self) -> PathBuf {
        self.root.join("share").join("ego-bundle")
    }

    pub fn toolchain_dir(&self) -> PathBuf {
        self.root.join("go")
    }

    /// Fail unless the host and enclave binaries are present.
    pub fn require_launch_binaries(&self) -> Result<(), RuntimeError> {
        for path in [self.host_binary(), self.enclave_binary()] {
            if !path.is_file() {
                return Err(RuntimeError::InstallationNotFound(path));
            }
        }
        Ok(())
    }
}
