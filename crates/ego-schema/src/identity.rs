use crate::section::{inspect, locate, EnclaveProperties, SectionState, SignedSection, SLOT_SIZE};
use crate::types::{SignerId, UniqueId};
use crate::SchemaError;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

const MEASUREMENT_DOMAIN: &[u8] = b"ego-measurement-v1";

/// Compute the measurement of a program.
///
/// Covers the enclave layout (attributes, heap, stack, TCS count) and every
/// program byte except the metadata slot itself, which is hashed as zeros.
/// The signing key is not an input, so re-signing identical content with a
/// different key yields the same value.
pub fn compute_unique_id(
    program: &[u8],
    slot_offset: usize,
    properties: &EnclaveProperties,
) -> UniqueId {
    let start = slot_offset.min(program.len());
    let end = (slot_offset + SLOT_SIZE).min(program.len());

    let mut hasher = Sha256::new();
    hasher.update(MEASUREMENT_DOMAIN);
    hasher.update(properties.attributes.to_le_bytes());
    hasher.update(properties.heap_pages.to_le_bytes());
    hasher.update(properties.stack_pages.to_le_bytes());
    hasher.update(properties.num_tcs.to_le_bytes());
    hasher.update(&program[..start]);
    hasher.update([0u8; SLOT_SIZE]);
    hasher.update(&program[end..]);
    UniqueId::from_bytes(hasher.finalize().into())
}

pub fn signer_id_of(key: &VerifyingKey) -> SignerId {
    SignerId::from_bytes(Sha256::digest(key.as_bytes()).into())
}

/// Fill the metadata slot of `program` in place.
pub fn sign_program(
    program: &mut [u8],
    properties: EnclaveProperties,
    key: &SigningKey,
) -> Result<SignedSection, SchemaError> {
    let offset = locate(program).ok_or(SchemaError::NoMetadataSection)?;
    if program.len() < offset + SLOT_SIZE {
        return Err(SchemaError::MalformedSection(format!(
            "slot truncated: expected {SLOT_SIZE} bytes at offset {offset}"
        )));
    }

    let unique_id = compute_unique_id(program, offset, &properties);
    let message = SignedSection::signed_bytes(&properties, unique_id.as_bytes());
    let signature = key.sign(&message);

    let section = SignedSection {
        properties,
        unique_id: *unique_id.as_bytes(),
        public_key: key.verifying_key().to_bytes(),
        signature: signature.to_bytes(),
    };
    program[offset..offset + SLOT_SIZE].copy_from_slice(&section.encode());
    Ok(section)
}

/// Check the signature and measurement of a signed program.
pub fn verify_program(program: &[u8]) -> Result<SignedSection, SchemaError> {
    let (offset, section) = match inspect(program)? {
        SectionState::Absent => return Err(SchemaError::NoMetadataSection),
        SectionState::Placeholder { .. } => return Err(SchemaError::Unsigned),
        SectionState::Signed { offset, section } => (offset, section),
    };

    let key = VerifyingKey::from_bytes(&section.public_key)
        .map_err(|e| SchemaError::Crypto(format!("invalid signer key: {e}")))?;
    let message = SignedSection::signed_bytes(&section.properties, &section.unique_id);
    key.verify(&message, &Signature::from_bytes(&section.signature))
        .map_err(|e| SchemaError::Crypto(format!("signature verification failed: {e}")))?;

    let expected = compute_unique_id(program, offset, &section.properties);
    if *expected.as_bytes() != section.unique_id {
        return Err(SchemaError::MalformedSection(
            "measurement does not match program content".to_owned(),
        ));
    }
    Ok(section)
}

/// Parse a PKCS#8 private key or an SPKI public key and return the public half.
pub fn parse_key_pem(text: &str) -> Result<VerifyingKey, SchemaError> {
    if let Ok(private) = SigningKey::from_pkcs8_pem(text) {
        return Ok(private.verifying_key());
    }
    VerifyingKey::from_public_key_pem(text)
        .map_err(|e| SchemaError::Crypto(format!("not a valid private or public key: {e}")))
}

/// Parse a PKCS#8 private signing key.
pub fn parse_signing_key_pem(text: &str) -> Result<SigningKey, SchemaError> {
    SigningKey::from_pkcs8_pem(text)
        .map_err(|e| SchemaError::Crypto(format!("not a valid private key: {e}")))
}

pub fn encode_private_pem(key: &SigningKey) -> Result<String, SchemaError> {
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| SchemaError::Crypto(format!("failed to encode private key: {e}")))?;
    Ok(pem.as_str().to_owned())
}

pub fn encode_public_pem(key: &VerifyingKey) -> Result<String, SchemaError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| SchemaError::Crypto(format!("failed to encode public key: {e}")))
}
