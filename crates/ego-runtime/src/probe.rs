use std::path::{Path, PathBuf};

/// In-kernel SGX driver device node.
pub const SGX_ENCLAVE_DEVICE: &str = "/dev/sgx_enclave";
/// Out-of-tree SGX driver device node.
pub const ISGX_DEVICE: &str = "/dev/isgx";

/// Best-effort view of the host used to pick remediation hints.
pub trait HostProbe {
    fn cpu_supports_sgx(&self) -> bool;

    fn path_exists(&self, path: &Path) -> bool;
}

/// Probes the machine this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn cpu_supports_sgx(&self) -> bool {
        cpuid_sgx()
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Fixed answers, for deterministic remediation output.
#[derive(Debug, Default, Clone)]
pub struct StaticProbe {
    pub sgx_cpu: bool,
    pub existing_paths: Vec<PathBuf>,
}

impl StaticProbe {
    pub fn new(sgx_cpu: bool, existing_paths: &[&str]) -> Self {
        Self {
            sgx_cpu,
            existing_paths: existing_paths.iter().map(PathBuf::from).collect(),
        }
    }
}

impl HostProbe for StaticProbe {
    fn cpu_supports_sgx(&self) -> bool {
        self.sgx_cpu
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.existing_paths.iter().any(|p| p == path)
    }
}

/// CPUID.(EAX=07H, ECX=0H):EBX[bit 2] reports SGX support.
#[cfg(target_arch = "x86_64")]
#[allow(unsafe_code, unused_unsafe)]
fn cpuid_sgx() -> bool {
    use std::arch::x86_64::{__cpuid, __cpuid_count};

    // SAFETY: CPUID is available on every x86_64 processor.
    let max_leaf = unsafe { __cpuid(0) }.eax;
    if max_leaf < 7 {
        return false;
    }
    // SAFETY: leaf 7 is within the supported range checked above.
    let features = unsafe { __cpuid_count(7, 0) };
    features.ebx & (1 << 2) != 0
}

#[cfg(not(target_arch = "x86_64"))]
fn cpuid_sgx() -> bool {
    false
}
