// src/leaf.rs
//! Binary decoding of RFC 6962 Merkle tree leaves.
//!
//! Every field is read with an explicit bounds check; the buffer length is
//! never assumed from context.

use thiserror::Error;

/// Fixed leaf prefix: version (1) + leaf type (1) + timestamp (8) + entry kind (2).
pub const HEADER_LEN: usize = 12;

/// Length prefix of the certificate payload (3-byte big-endian).
const CERT_LEN_PREFIX: usize = 3;

/// Entry kind codes carried in the leaf header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Final X.509 certificate; payload is a length-prefixed DER blob.
    Certificate,
    /// Precertificate; recognized but never decoded further.
    Precert,
}

impl EntryKind {
    fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(EntryKind::Certificate),
            1 => Some(EntryKind::Precert),
            _ => None,
        }
    }
}

/// Decoded leaf header with the undecoded remainder borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleLeaf<'a> {
    pub version: u8,
    pub leaf_type: u8,
    /// Milliseconds since the Unix epoch, as logged by the CT log.
    pub timestamp: u64,
    pub kind: EntryKind,
    pub payload: &'a [u8],
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LeafError {
    #[error("leaf truncated: {len} bytes, header needs {HEADER_LEN}")]
    TruncatedHeader { len: usize },

    #[error("unrecognized entry kind code {0}")]
    UnknownEntryKind(u16),

    #[error("certificate payload truncated: declared {declared} bytes, {available} available")]
    TruncatedCertificate { declared: usize, available: usize },
}

/// Decode the fixed leaf header.
///
/// The payload is returned raw; for `Certificate` leaves it must be fed
/// through [`certificate_payload`] to strip the length prefix.
pub fn decode(buf: &[u8]) -> Result<MerkleLeaf<'_>, LeafError> {
    if buf.len() < HEADER_LEN {
        return Err(LeafError::TruncatedHeader { len: buf.len() });
    }

    let timestamp = u64::from_be_bytes([
        buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
    ]);
    let code = u16::from_be_bytes([buf[10], buf[11]]);
    let kind = EntryKind::from_code(code).ok_or(LeafError::UnknownEntryKind(code))?;

    Ok(MerkleLeaf {
        version: buf[0],
        leaf_type: buf[1],
        timestamp,
        kind,
        payload: &buf[HEADER_LEN..],
    })
}

/// Extract the DER certificate from a `Certificate` leaf payload.
///
/// Reads a 3-byte big-endian length and slices exactly that many bytes.
/// Trailing bytes (SCT extensions) are ignored.
pub fn certificate_payload(payload: &[u8]) -> Result<&[u8], LeafError> {
    if payload.len() < CERT_LEN_PREFIX {
        return Err(LeafError::TruncatedCertificate {
            declared: 0,
            available: payload.len(),
        });
    }

    let declared =
        ((payload[0] as usize) << 16) | ((payload[1] as usize) << 8) | (payload[2] as usize);
    let rest = &payload[CERT_LEN_PREFIX..];

    if rest.len() < declared {
        return Err(LeafError::TruncatedCertificate {
            declared,
            available: rest.len(),
        });
    }

    Ok(&rest[..declared])
}
