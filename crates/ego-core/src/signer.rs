//! `ego sign`: embed signed enclave metadata into a program.
//!
//! The argument is resolved once into a [`SignTarget`]. A program path runs
//! the auto-generate flow (default `enclave.json`, fresh key pair); a
//! configuration path signs exactly what the configuration declares.

use crate::fsutil::{mode_of, write_atomic};
use crate::CoreError;
use ed25519_dalek::SigningKey;
use ego_schema::section::locate;
use ego_schema::{
    encode_private_pem, encode_public_pem, parse_config_file, parse_signing_key_pem, sign_program,
    signer_id_of, SchemaError, SignerId, SigningConfig, UniqueId, CONFIG_FILE_NAME,
    PUBLIC_KEY_FILE,
};
use rand::rngs::OsRng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PRIVATE_KEY_MODE: u32 = 0o600;
const PUBLIC_FILE_MODE: u32 = 0o644;

/// What `sign` was asked to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignTarget {
    /// An executable; configuration and key are generated next to the working directory.
    Program(PathBuf),
    /// A signing configuration file.
    Config(PathBuf),
}

impl SignTarget {
    /// Resolve the `sign` argument against `work_dir`.
    ///
    /// Without an argument, `enclave.json` in `work_dir` is used. Arguments
    /// ending in `.json` are configurations; anything else is a program.
    pub fn resolve(arg: Option<&Path>, work_dir: &Path) -> Result<Self, CoreError> {
        let Some(arg) = arg else {
            let config = work_dir.join(CONFIG_FILE_NAME);
            return if config.is_file() {
                Ok(Self::Config(config))
            } else {
                Err(CoreError::NoProgram)
            };
        };

        fs::metadata(work_dir.join(arg))?;
        if arg.extension().is_some_and(|ext| ext == "json") {
            Ok(Self::Config(work_dir.join(arg)))
        } else {
            Ok(Self::Program(arg.to_path_buf()))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignResult {
    pub config: PathBuf,
    pub program: PathBuf,
    pub signer_id: SignerId,
    pub unique_id: UniqueId,
    /// Files created by this run (configuration and keys).
    pub generated: Vec<PathBuf>,
}

pub fn sign(target: &SignTarget, work_dir: &Path) -> Result<SignResult, CoreError> {
    match target {
        SignTarget::Config(config) => {
            let parsed = parse_config_file(config)?;
            sign_with_config(config, &parsed, Vec::new())
        }
        SignTarget::Program(program) => sign_program_default(program, work_dir),
    }
}

fn sign_program_default(program: &Path, work_dir: &Path) -> Result<SignResult, CoreError> {
    let program_path = work_dir.join(program);
    // Reject programs that cannot carry metadata before anything is written.
    if locate(&fs::read(&program_path)?).is_none() {
        return Err(SchemaError::NoMetadataSection.into());
    }

    let config_path = work_dir.join(CONFIG_FILE_NAME);
    let mut generated = Vec::new();
    let config = if config_path.is_file() {
        let existing = parse_config_file(&config_path)?;
        if !same_file(&work_dir.join(&existing.exe), &program_path) {
            return Err(CoreError::ConfigConflict {
                config: config_path,
                exe: existing.exe,
            });
        }
        debug!("reusing {}", config_path.display());
        existing
    } else {
        let config = SigningConfig::for_program(&program.to_string_lossy());
        write_atomic(
            &config_path,
            config.to_json_pretty()?.as_bytes(),
            PUBLIC_FILE_MODE,
        )?;
        info!("created {}", config_path.display());
        generated.push(config_path.clone());
        config
    };

    sign_with_config(&config_path, &config, generated)
}

fn sign_with_config(
    config_path: &Path,
    config: &SigningConfig,
    mut generated: Vec<PathBuf>,
) -> Result<SignResult, CoreError> {
    let base = config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let key_path = base.join(&config.key);
    let exe_path = base.join(&config.exe);

    let key = if key_path.exists() {
        parse_signing_key_pem(&fs::read_to_string(&key_path)?)?
    } else {
        let key = SigningKey::generate(&mut OsRng);
        generated.extend(write_key_pair(&key, &key_path)?);
        key
    };

    let mut bytes = fs::read(&exe_path)?;
    let section = sign_program(&mut bytes, config.properties()?, &key)?;
    write_atomic(&exe_path, &bytes, mode_of(&exe_path)?)?;
    info!("signed {}", exe_path.display());

    Ok(SignResult {
        config: config_path.to_path_buf(),
        program: exe_path,
        signer_id: signer_id_of(&key.verifying_key()),
        unique_id: UniqueId::from_bytes(section.unique_id),
        generated,
    })
}

/// Write the private key and a `public.pem` beside it.
fn write_key_pair(key: &SigningKey, private_path: &Path) -> Result<Vec<PathBuf>, CoreError> {
    if let Some(dir) = private_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let public_path = private_path.with_file_name(PUBLIC_KEY_FILE);
    write_atomic(
        private_path,
        encode_private_pem(key)?.as_bytes(),
        PRIVATE_KEY_MODE,
    )?;
    write_atomic(
        &public_path,
        encode_public_pem(&key.verifying_key())?.as_bytes(),
        PUBLIC_FILE_MODE,
    )?;
    info!("generated key pair {}", private_path.display());
    Ok(vec![private_path.to_path_buf(), public_path])
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ego_schema::section::{SECTION_MARKER, SLOT_SIZE};
    use ego_schema::{verify_program, DEFAULT_KEY_FILE};
    use std::os::unix::fs::PermissionsExt;

    fn write_program(dir: &Path, name: &str) -> PathBuf {
        let mut bytes = b"\x7fELF program text".to_vec();
        bytes.extend_from_slice(&SECTION_MARKER);
        bytes.extend_from_slice(&[0u8; SLOT_SIZE]);
        bytes.extend_from_slice(b"data");
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn resolve_without_argument_needs_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SignTarget::resolve(None, dir.path()),
            Err(CoreError::NoProgram)
        ));

        fs::write(dir.path().join(CONFIG_FILE_NAME), "{}").unwrap();
        assert_eq!(
            SignTarget::resolve(None, dir.path()).unwrap(),
            SignTarget::Config(dir.path().join(CONFIG_FILE_NAME))
        );
    }

    #[test]
    fn resolve_distinguishes_config_and_program() {
        let dir = tempfile::tempdir().unwrap();
        write_program(dir.path(), "app");
        fs::write(dir.path().join("custom.json"), "{}").unwrap();

        assert_eq!(
            SignTarget::resolve(Some(Path::new("app")), dir.path()).unwrap(),
            SignTarget::Program(PathBuf::from("app"))
        );
        assert!(matches!(
            SignTarget::resolve(Some(Path::new("custom.json")), dir.path()).unwrap(),
            SignTarget::Config(_)
        ));
    }

    #[test]
    fn resolve_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = SignTarget::resolve(Some(Path::new("missing")), dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn auto_mode_generates_config_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let program = write_program(dir.path(), "app");

        let result = sign(&SignTarget::Program(PathBuf::from("app")), dir.path()).unwrap();
        assert_eq!(result.generated.len(), 3);
        for name in [CONFIG_FILE_NAME, DEFAULT_KEY_FILE, PUBLIC_KEY_FILE] {
            assert!(dir.path().join(name).is_file(), "{name} missing");
        }

        let config = parse_config_file(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.exe, "app");
        assert!(config.debug);

        let section = verify_program(&fs::read(&program).unwrap()).unwrap();
        assert_eq!(section.unique_id, *result.unique_id.as_bytes());
        assert_eq!(mode_of(&program).unwrap(), 0o755);
        assert_eq!(
            mode_of(&dir.path().join(DEFAULT_KEY_FILE)).unwrap(),
            PRIVATE_KEY_MODE
        );
    }

    #[test]
    fn resigning_reuses_generated_key() {
        let dir = tempfile::tempdir().unwrap();
        write_program(dir.path(), "app");

        let first = sign(&SignTarget::Program(PathBuf::from("app")), dir.path()).unwrap();
        let target = SignTarget::resolve(None, dir.path()).unwrap();
        let second = sign(&target, dir.path()).unwrap();

        assert!(second.generated.is_empty());
        assert_eq!(first.signer_id, second.signer_id);
        assert_eq!(first.unique_id, second.unique_id);
    }

    #[test]
    fn auto_mode_refuses_foreign_config() {
        let dir = tempfile::tempdir().unwrap();
        write_program(dir.path(), "one");
        write_program(dir.path(), "two");
        sign(&SignTarget::Program(PathBuf::from("one")), dir.path()).unwrap();

        let err = sign(&SignTarget::Program(PathBuf::from("two")), dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigConflict { ref exe, .. } if exe == "one"));
    }

    #[test]
    fn program_without_section_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plain"), b"not built for enclaves").unwrap();

        let err = sign(&SignTarget::Program(PathBuf::from("plain")), dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Schema(SchemaError::NoMetadataSection)
        ));
        assert!(!dir.path().join(CONFIG_FILE_NAME).exists());
        assert!(!dir.path().join(DEFAULT_KEY_FILE).exists());
    }

    #[test]
    fn config_mode_generates_declared_key() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("build");
        fs::create_dir_all(&sub).unwrap();
        write_program(&sub, "server");
        let config = sub.join("server.json");
        fs::write(
            &config,
            r#"{"exe": "server", "key": "keys/signing.pem", "heapSize": 64, "productID": 7}"#,
        )
        .unwrap();

        let result = sign(&SignTarget::Config(config), dir.path()).unwrap();
        assert!(sub.join("keys/signing.pem").is_file());
        assert!(sub.join("keys").join(PUBLIC_KEY_FILE).is_file());
        assert_eq!(result.generated.len(), 2);

        let section = verify_program(&fs::read(sub.join("server")).unwrap()).unwrap();
        assert_eq!(section.properties.product_id, 7);
        assert_eq!(section.properties.heap_pages, 64 * 256);
    }

    #[test]
    fn invalid_key_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_program(dir.path(), "app");
        fs::write(dir.path().join(DEFAULT_KEY_FILE), "garbage").unwrap();
        let config = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &config,
            SigningConfig::for_program("app").to_json_pretty().unwrap(),
        )
        .unwrap();

        let err = sign(&SignTarget::Config(config), dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Schema(SchemaError::Crypto(_))));
    }
}
