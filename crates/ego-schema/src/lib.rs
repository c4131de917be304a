//! Signing configuration, identity values, and the enclave metadata section for EGo.
//!
//! This crate defines the schema layer: `enclave.json` parsing (`SigningConfig`),
//! the fixed-size metadata slot that the enclave toolchain reserves in every
//! program (`section`), and the two identity values derived from a signed
//! program: the key-derived `SignerId` and the content-derived `UniqueId`.

pub mod config;
pub mod identity;
pub mod section;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, SigningConfig, CONFIG_FILE_NAME, DEFAULT_KEY_FILE,
    PUBLIC_KEY_FILE,
};
pub use identity::{
    compute_unique_id, encode_private_pem, encode_public_pem, parse_key_pem, parse_signing_key_pem,
    sign_program, signer_id_of, verify_program,
};
pub use section::{inspect, EnclaveProperties, SectionState, SignedSection};
pub use types::{SignerId, UniqueId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read signing configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse signing configuration: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("invalid signing configuration: {0}")]
    InvalidConfig(String),
    #[error("the metadata section is missing in the binary")]
    NoMetadataSection,
    #[error("the binary is not signed")]
    Unsigned,
    #[error("malformed metadata section: {0}")]
    MalformedSection(String),
    #[error("crypto error: {0}")]
    Crypto(String),
}
