//! The enclave metadata slot embedded in every program built with the enclave toolchain.
//!
//! The toolchain reserves a zeroed slot right after [`SECTION_MARKER`]. Signing
//! fills the slot in place; a program without the marker cannot be signed at
//! all, and a program whose slot is still zero is built but unsigned.
//!
//! Slot layout (little-endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | format version (0 = placeholder) |
//! | 4 | 8 | attributes |
//! | 12 | 2 | product id |
//! | 14 | 2 | security version |
//! | 16 | 8 | heap pages |
//! | 24 | 8 | stack pages |
//! | 32 | 8 | TCS count |
//! | 40 | 32 | unique id |
//! | 72 | 32 | signer public key |
//! | 104 | 64 | signature over bytes `0..72` |

use crate::SchemaError;

pub const SECTION_MARKER: [u8; 16] = *b"EGO_OEINFO_SLOT\0";
pub const SLOT_SIZE: usize = 512;
pub const FORMAT_VERSION: u32 = 1;

/// Length of the signed prefix of the slot (header plus unique id).
pub const SIGNED_LEN: usize = 72;

const UNIQUE_ID_OFFSET: usize = 40;
const PUBLIC_KEY_OFFSET: usize = 72;
const SIGNATURE_OFFSET: usize = 104;
const SIGNATURE_END: usize = 168;

pub mod attributes {
    pub const DEBUG: u64 = 1 << 1;
    pub const MODE64BIT: u64 = 1 << 2;
    pub const EXECUTABLE_HEAP: u64 = 1 << 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnclaveProperties {
    pub attributes: u64,
    pub product_id: u16,
    pub security_version: u16,
    pub heap_pages: u64,
    pub stack_pages: u64,
    pub num_tcs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSection {
    pub properties: EnclaveProperties,
    pub unique_id: [u8; 32],
    pub public_key: [u8; 32],
    pub signature: [u8; 64],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionState {
    /// No marker: the program was not built with the enclave toolchain.
    Absent,
    /// Marker present, slot still zero.
    Placeholder { offset: usize },
    Signed {
        offset: usize,
        section: SignedSection,
    },
}

impl SectionState {
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }
}

/// Offset of the slot (the byte after the marker), if the marker is present.
pub fn locate(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(SECTION_MARKER.len())
        .position(|w| w == SECTION_MARKER.as_slice())
        .map(|pos| pos + SECTION_MARKER.len())
}

pub fn inspect(bytes: &[u8]) -> Result<SectionState, SchemaError> {
    let Some(offset) = locate(bytes) else {
        return Ok(SectionState::Absent);
    };
    let slot = bytes.get(offset..offset + SLOT_SIZE).ok_or_else(|| {
        SchemaError::MalformedSection(format!(
            "slot truncated: expected {SLOT_SIZE} bytes at offset {offset}"
        ))
    })?;
    if slot.iter().all(|b| *b == 0) {
        return Ok(SectionState::Placeholder { offset });
    }
    let section = SignedSection::decode(slot)?;
    Ok(SectionState::Signed { offset, section })
}

impl EnclaveProperties {
    fn write_header(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        out[4..12].copy_from_slice(&self.attributes.to_le_bytes());
        out[12..14].copy_from_slice(&self.product_id.to_le_bytes());
        out[14..16].copy_from_slice(&self.security_version.to_le_bytes());
        out[16..24].copy_from_slice(&self.heap_pages.to_le_bytes());
        out[24..32].copy_from_slice(&self.stack_pages.to_le_bytes());
        out[32..40].copy_from_slice(&self.num_tcs.to_le_bytes());
    }
}

impl SignedSection {
    pub fn encode(&self) -> [u8; SLOT_SIZE] {
        let mut out = [0u8; SLOT_SIZE];
        self.properties.write_header(&mut out);
        out[UNIQUE_ID_OFFSET..PUBLIC_KEY_OFFSET].copy_from_slice(&self.unique_id);
        out[PUBLIC_KEY_OFFSET..SIGNATURE_OFFSET].copy_from_slice(&self.public_key);
        out[SIGNATURE_OFFSET..SIGNATURE_END].copy_from_slice(&self.signature);
        out
    }

    pub fn decode(slot: &[u8]) -> Result<Self, SchemaError> {
        if slot.len() < SLOT_SIZE {
            return Err(SchemaError::MalformedSection(format!(
                "slot is {} bytes, expected {SLOT_SIZE}",
                slot.len()
            )));
        }
        let version = u32::from_le_bytes(fixed(&slot[0..4]));
        if version != FORMAT_VERSION {
            return Err(SchemaError::MalformedSection(format!(
                "unsupported format version {version}"
            )));
        }
        if slot[SIGNATURE_END..SLOT_SIZE].iter().any(|b| *b != 0) {
            return Err(SchemaError::MalformedSection(
                "non-zero padding after signature".to_owned(),
            ));
        }
        let properties = EnclaveProperties {
            attributes: u64::from_le_bytes(fixed(&slot[4..12])),
            product_id: u16::from_le_bytes(fixed(&slot[12..14])),
            security_version: u16::from_le_bytes(fixed(&slot[14..16])),
            heap_pages: u64::from_le_bytes(fixed(&slot[16..24])),
            stack_pages: u64::from_le_bytes(fixed(&slot[24..32])),
            num_tcs: u64::from_le_bytes(fixed(&slot[32..40])),
        };
        Ok(Self {
            properties,
            unique_id: fixed(&slot[UNIQUE_ID_OFFSET..PUBLIC_KEY_OFFSET]),
            public_key: fixed(&slot[PUBLIC_KEY_OFFSET..SIGNATURE_OFFSET]),
            signature: fixed(&slot[SIGNATURE_OFFSET..SIGNATURE_END]),
        })
    }

    /// The bytes covered by the signature.
    pub fn signed_bytes(properties: &EnclaveProperties, unique_id: &[u8; 32]) -> [u8; SIGNED_LEN] {
        let mut out = [0u8; SIGNED_LEN];
        properties.write_header(&mut out);
        out[UNIQUE_ID_OFFSET..SIGNED_LEN].copy_from_slice(unique_id);
        out
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
