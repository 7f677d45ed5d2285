//! Fixed-width binary identifiers.
//!
//! Objects are addressed by 20-byte SHA-1 digests, chunks by 32-byte SHA-256
//! digests. Both are stored as raw bytes; hex is a presentation format only.

use std::fmt;
use std::str::FromStr;

use gitvault_utils_hash::Algorithm;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseIdError {
    #[error("identifier has wrong length {actual}, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("identifier is not valid hex: {0}")]
    InvalidHex(String),
}

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// The all-zero id, conventionally meaning "no object" / "should not exist".
    pub const ZERO: ObjectId = ObjectId([0; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        ObjectId(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseIdError> {
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| ParseIdError::InvalidLength {
            expected: 20,
            actual: bytes.len(),
        })?;
        Ok(ObjectId(bytes))
    }

    /// Parse a 40-character hex representation (bytes, as found in ref values).
    pub fn from_hex(hex_bytes: &[u8]) -> Result<Self, ParseIdError> {
        if hex_bytes.len() != 40 {
            return Err(ParseIdError::InvalidLength {
                expected: 40,
                actual: hex_bytes.len(),
            });
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(hex_bytes, &mut out)
            .map_err(|e| ParseIdError::InvalidHex(e.to_string()))?;
        Ok(ObjectId(out))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The 40-byte ASCII hex form used in ref values.
    pub fn hex_bytes(&self) -> Vec<u8> {
        hex::encode(self.0).into_bytes()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl FromStr for ObjectId {
    type Err = ParseIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.as_bytes())
    }
}

/// A 32-byte SHA-256 chunk identifier, always computed over the raw
/// (pre-compression) chunk bytes so identity is stable across codec choices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId([u8; 32]);

impl ChunkId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        ChunkId(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseIdError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| ParseIdError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(ChunkId(bytes))
    }

    /// Digest raw chunk bytes into their identifier.
    pub fn digest(data: &[u8]) -> Self {
        let hash = Algorithm::SHA256.digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(hash.digest_bytes());
        ChunkId(out)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for ChunkId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({self})")
    }
}
