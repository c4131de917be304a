use crate::section::{attributes, EnclaveProperties};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Conventional signing configuration filename, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "enclave.json";
pub const DEFAULT_KEY_FILE: &str = "private.pem";
pub const PUBLIC_KEY_FILE: &str = "public.pem";

const PAGE_SIZE: u64 = 4096;
/// Upper bound of `heapSize` (1 TiB).
pub const MAX_HEAP_SIZE_MIB: u64 = 1 << 20;
/// Upper bound of `stackSize` (1 GiB).
pub const MAX_STACK_SIZE_KIB: u64 = 1 << 20;

/// Contents of `enclave.json`.
///
/// `exe` and `key` are resolved relative to the directory that holds the
/// configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SigningConfig {
    pub exe: String,
    pub key: String,
    #[serde(default)]
    pub debug: bool,
    /// Heap size in MiB.
    pub heap_size: u64,
    /// Stack size in KiB.
    #[serde(default = "default_stack_size")]
    pub stack_size: u64,
    #[serde(default = "default_num_tcs", rename = "numTCS")]
    pub num_tcs: u64,
    #[serde(default)]
    pub executable_heap: bool,
    #[serde(default, rename = "productID")]
    pub product_id: u16,
    #[serde(default)]
    pub security_version: u16,
}

fn default_stack_size() -> u64 {
    1024
}

fn default_num_tcs() -> u64 {
    32
}

impl SigningConfig {
    /// The configuration written when only a program path is given to `sign`.
    pub fn for_program(exe: &str) -> Self {
        Self {
            exe: exe.to_owned(),
            key: DEFAULT_KEY_FILE.to_owned(),
            debug: true,
            heap_size: 512,
            stack_size: default_stack_size(),
            num_tcs: default_num_tcs(),
            executable_heap: false,
            product_id: 1,
            security_version: 1,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.exe.trim().is_empty() {
            return Err(SchemaError::InvalidConfig("exe must not be empty".to_owned()));
        }
        if self.key.trim().is_empty() {
            return Err(SchemaError::InvalidConfig("key must not be empty".to_owned()));
        }
        if self.heap_size == 0 {
            return Err(SchemaError::InvalidConfig(
                "heapSize must be greater than 0".to_owned(),
            ));
        }
        if self.heap_size > MAX_HEAP_SIZE_MIB {
            return Err(SchemaError::InvalidConfig(format!(
                "heapSize must not exceed {MAX_HEAP_SIZE_MIB} MiB"
            )));
        }
        if self.stack_size == 0 {
            return Err(SchemaError::InvalidConfig(
                "stackSize must be greater than 0".to_owned(),
            ));
        }
        if self.stack_size > MAX_STACK_SIZE_KIB {
            return Err(SchemaError::InvalidConfig(format!(
                "stackSize must not exceed {MAX_STACK_SIZE_KIB} KiB"
            )));
        }
        if self.num_tcs == 0 {
            return Err(SchemaError::InvalidConfig(
                "numTCS must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Enclave properties embedded into the metadata section.
    pub fn properties(&self) -> Result<EnclaveProperties, SchemaError> {
        let mut attrs = attributes::MODE64BIT;
        if self.debug {
            attrs |= attributes::DEBUG;
        }
        if self.executable_heap {
            attrs |= attributes::EXECUTABLE_HEAP;
        }
        let heap_bytes = self
            .heap_size
            .checked_mul(1024 * 1024)
            .ok_or_else(|| SchemaError::InvalidConfig("heapSize is too large".to_owned()))?;
        let stack_bytes = self
            .stack_size
            .checked_mul(1024)
            .ok_or_else(|| SchemaError::InvalidConfig("stackSize is too large".to_owned()))?;
        Ok(EnclaveProperties {
            attributes: attrs,
            product_id: self.product_id,
            security_version: self.security_version,
            heap_pages: heap_bytes / PAGE_SIZE,
            stack_pages: stack_bytes.div_ceil(PAGE_SIZE),
            num_tcs: self.num_tcs,
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        let mut s = serde_json::to_string_pretty(self)?;
        s.push('\n');
        Ok(s)
    }
}

pub fn parse_config_str(input: &str) -> Result<SigningConfig, SchemaError> {
    let config: SigningConfig = serde_json::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<SigningConfig, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
