use crate::CoreError;
use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Replace `dest` with `data` via a temp file in the same directory.
pub(crate) fn write_atomic(dest: &Path, data: &[u8], mode: u32) -> Result<(), CoreError> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.as_file().set_permissions(Permissions::from_mode(mode))?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

/// Permission bits of an existing file.
pub(crate) fn mode_of(path: &Path) -> Result<u32, CoreError> {
    Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
}
