//! Self-contained executables: loader stub + runtime + program.
//!
//! Artifact layout:
//!
//! ```text
//! [ loader stub ][ tar payload ][ len: u64 LE ][ blake3(payload): 32 ][ "EGOBNDL1" ]
//! ```
//!
//! The payload holds exactly three regular files, `ego-host`, `ego-enclave`
//! and `program`, packed deterministically: fixed order, mtime 0, owner 0:0,
//! source permissions.

use crate::fsutil::write_atomic;
use crate::CoreError;
use ego_runtime::{run_enclave, ProcessRunner};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BUNDLE_MAGIC: [u8; 8] = *b"EGOBNDL1";
pub const TRAILER_LEN: usize = 8 + 32 + 8;
/// Appended to the program's file name when no output is given.
pub const BUNDLE_SUFFIX: &str = "-bundle";

const HOST_ENTRY: &str = "ego-host";
const ENCLAVE_ENTRY: &str = "ego-enclave";
const PROGRAM_ENTRY: &str = "program";
const BUNDLE_MODE: u32 = 0o755;

/// Paths of an unpacked payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleContents {
    pub host: PathBuf,
    pub enclave: PathBuf,
    pub program: PathBuf,
}

/// Pack the runtime binaries and the program into a payload.
pub fn pack_payload(host: &Path, enclave: &Path, program: &Path) -> Result<Vec<u8>, CoreError> {
    let mut ar = tar::Builder::new(Vec::new());
    for (name, source) in [
        (HOST_ENTRY, host),
        (ENCLAVE_ENTRY, enclave),
        (PROGRAM_ENTRY, program),
    ] {
        let data = fs::read(source)?;
        let mode = fs::metadata(source)?.permissions().mode();
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(mode & 0o7777);
        header.set_size(data.len() as u64);
        header.set_cksum();
        ar.append_data(&mut header, name, data.as_slice())?;
    }
    Ok(ar.into_inner()?)
}

/// Write `stub` + `payload` + trailer to `output` with mode 0755, replacing it atomically.
pub fn write_bundle(stub: &[u8], payload: &[u8], output: &Path) -> Result<(), CoreError> {
    let mut artifact = Vec::with_capacity(stub.len() + payload.len() + TRAILER_LEN);
    artifact.extend_from_slice(stub);
    artifact.extend_from_slice(payload);
    artifact.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    artifact.extend_from_slice(blake3::hash(payload).as_bytes());
    artifact.extend_from_slice(&BUNDLE_MAGIC);
    write_atomic(output, &artifact, BUNDLE_MODE)
}

/// Locate and verify the payload at the end of a bundled executable.
pub fn extract_payload(artifact: &[u8]) -> Result<&[u8], CoreError> {
    let trailer_start = artifact
        .len()
        .checked_sub(TRAILER_LEN)
        .ok_or_else(|| CoreError::InvalidBundle("file too short".to_owned()))?;
    let trailer = &artifact[trailer_start..];
    if trailer[40..] != BUNDLE_MAGIC {
        return Err(CoreError::InvalidBundle("no bundle trailer".to_owned()));
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&trailer[..8]);
    let len = usize::try_from(u64::from_le_bytes(len))
        .map_err(|_| CoreError::InvalidBundle("payload length overflow".to_owned()))?;
    let start = trailer_start
        .checked_sub(len)
        .ok_or_else(|| CoreError::InvalidBundle("payload truncated".to_owned()))?;
    let payload = &artifact[start..trailer_start];

    if blake3::hash(payload).as_bytes() != &trailer[8..40] {
        return Err(CoreError::InvalidBundle("payload digest mismatch".to_owned()));
    }
    Ok(payload)
}

/// Unpack a verified payload into `dir`.
pub fn unpack_payload(payload: &[u8], dir: &Path) -> Result<BundleContents, CoreError> {
    fs::create_dir_all(dir)?;
    let mut ar = tar::Archive::new(payload);
    ar.set_preserve_permissions(true);
    ar.set_preserve_mtime(false);
    ar.set_unpack_xattrs(false);
    ar.unpack(dir)?;

    let contents = BundleContents {
        host: dir.join(HOST_ENTRY),
        enclave: dir.join(ENCLAVE_ENTRY),
        program: dir.join(PROGRAM_ENTRY),
    };
    for path in [&contents.host, &contents.enclave, &contents.program] {
        if !path.is_file() {
            return Err(CoreError::InvalidBundle(format!(
                "payload is missing {}",
                path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned())
            )));
        }
    }
    Ok(contents)
}

/// Run the program carried by the bundled executable at `artifact`.
///
/// The payload is unpacked into a private temporary directory that is
/// removed once the host process exits.
pub fn run_bundle(
    artifact: &Path,
    args: &[String],
    env: &[(String, String)],
    runner: &dyn ProcessRunner,
) -> Result<i32, CoreError> {
    let bytes = fs::read(artifact)?;
    let payload = extract_payload(&bytes)?;
    let dir = tempfile::Builder::new().prefix("ego-bundle-").tempdir()?;
    let contents = unpack_payload(payload, dir.path())?;
    debug!("unpacked bundle into {}", dir.path().display());

    let code = run_enclave(
        &contents.program,
        args,
        &contents.host,
        &contents.enclave,
        env,
        runner,
    )?;
    Ok(code)
}
