//! Identity types for images and recognised entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier of a recognisable entity, as assigned by the classifier's label space.
/// Also the lookup key for the enrichment data source.
pub type EntityId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 digest length in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// Content-addressed identity of an uploaded image.
///
/// Two byte-identical images always produce the same fingerprint. The digest
/// is SHA-256, so distinct content collides only with negligible probability.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageFingerprint([u8; FINGERPRINT_LEN]);

impl ImageFingerprint {
    /// Compute the fingerprint of raw image bytes.
    pub fn of(image_bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(image_bytes);
        let result = hasher.finalize();
        let mut hash = [0u8; FINGERPRINT_LEN];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Wrap an already computed digest.
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(s: &str) -> Result<Self, FingerprintParseError> {
        let decoded = hex::decode(s).map_err(|_| FingerprintParseError(s.to_string()))?;
        let bytes: [u8; FINGERPRINT_LEN] = decoded
            .try_into()
            .map_err(|_| FingerprintParseError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// Compute the fingerprint of raw image bytes.
pub fn fingerprint_of(image_bytes: &[u8]) -> ImageFingerprint {
    ImageFingerprint::of(image_bytes)
}

impl fmt::Display for ImageFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ImageFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageFingerprint({})", &self.to_hex()[..12])
    }
}

impl Serialize for ImageFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ImageFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Error parsing an ImageFingerprint from hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintParseError(pub String);

impl fmt::Display for FingerprintParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid image fingerprint: {}", self.0)
    }
}

impl std::error::Error for FingerprintParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_bytes_same_fingerprint() {
        let a = ImageFingerprint::of(b"\x89PNG fake image");
        let b = ImageFingerprint::of(b"\x89PNG fake image");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_bytes_distinct_fingerprint() {
        let a = ImageFingerprint::of(b"image-a");
        let b = ImageFingerprint::of(b"image-b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        let fp = fingerprint_of(b"abc");
        assert_eq!(
            fp.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hex_roundtrip_and_rejects_garbage() {
        let fp = fingerprint_of(b"pikachu.png");
        assert_eq!(ImageFingerprint::from_hex(&fp.to_hex()).unwrap(), fp);
        assert!(ImageFingerprint::from_hex("not-hex").is_err());
        assert!(ImageFingerprint::from_hex("abcd").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let fp = fingerprint_of(b"abc");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let back: ImageFingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
