//! Fixed-width hash and secret values

use crate::error::{CoordinatorError, CoordinatorResult};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Keccak-256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

fn parse_hex32(value: &str) -> CoordinatorResult<[u8; 32]> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped)
        .map_err(|e| CoordinatorError::Internal(format!("Invalid hex value: {}", e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CoordinatorError::Internal(format!("Expected 32 bytes, got {}", b.len()))
    })
}

/// 32-byte digest, serialized as 0x-prefixed hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(value: &str) -> CoordinatorResult<Self> {
        parse_hex32(value).map(Hash32)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Hash32::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Swap secret (hash-lock preimage).
///
/// `Debug` never prints the value. The plaintext only leaves the process via
/// [`Secret::expose_hex`], which the coordinator calls after the vault has
/// authorized the release.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; 32]);

impl Secret {
    /// Fresh secret from the OS random source
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Secret(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Secret(bytes)
    }

    /// Commitment published in the hash lock
    pub fn hash(&self) -> Hash32 {
        keccak256(&self.0)
    }

    pub fn expose_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.expose_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse_hex32(&value)
            .map(Secret)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            keccak256(b"").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::from_bytes([0xab; 32]);
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("abab"));
        assert_eq!(printed, "Secret(<redacted>)");
    }

    #[test]
    fn test_hash_hex_parsing() {
        let hash = keccak256(b"fill");
        assert_eq!(Hash32::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(Hash32::from_hex("0x1234").is_err());
        assert!(Hash32::from_hex("zz").is_err());
    }

    #[test]
    fn test_random_secrets_differ() {
        assert_ne!(Secret::random(), Secret::random());
    }
}
