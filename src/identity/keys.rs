//! Identity key encoding
//!
//! Public keys travel as base58 "key addresses": the compressed secp256k1
//! point followed by the first four bytes of its SHA-256 digest.
use crate::error::{AuthzError, AuthzResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of a compressed secp256k1 point
pub const PUBLIC_KEY_LEN: usize = 33;
/// Length of an extended key chain code
pub const CHAIN_CODE_LEN: usize = 32;
const CHECKSUM_LEN: usize = 4;

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

fn encode_with_checksum(payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&checksum(payload));
    bs58::encode(bytes).into_string()
}

/// Decode a base58 string and strip its checksum, expecting `payload_len` bytes
fn decode_with_checksum(s: &str, payload_len: usize) -> AuthzResult<Vec<u8>> {
    let bytes = bs58::decode(s.trim())
        .into_vec()
        .map_err(|e| AuthzError::Validation(format!("Invalid base58: {}", e)))?;

    if bytes.len() != payload_len + CHECKSUM_LEN {
        return Err(AuthzError::Validation(format!(
            "Expected {} bytes, got {}",
            payload_len + CHECKSUM_LEN,
            bytes.len()
        )));
    }

    let (payload, check) = bytes.split_at(payload_len);
    if checksum(payload) != check {
        return Err(AuthzError::Validation("Key checksum mismatch".to_string()));
    }

    Ok(payload.to_vec())
}

fn validate_point(bytes: &[u8]) -> AuthzResult<()> {
    k256::PublicKey::from_sec1_bytes(bytes)
        .map(|_| ())
        .map_err(|_| AuthzError::Validation("Not a valid secp256k1 point".to_string()))
}

/// Identity public key (compressed secp256k1)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Build from compressed SEC1 bytes, validating the point
    pub fn from_bytes(bytes: &[u8]) -> AuthzResult<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(AuthzError::Validation(format!(
                "Public key must be {} bytes",
                PUBLIC_KEY_LEN
            )));
        }
        validate_point(bytes)?;

        let mut key = [0u8; PUBLIC_KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Parse a base58 key address
    pub fn parse(s: &str) -> AuthzResult<Self> {
        let payload = decode_with_checksum(s, PUBLIC_KEY_LEN)?;
        Self::from_bytes(&payload)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Base58 key address
    pub fn to_address(&self) -> String {
        encode_with_checksum(&self.0)
    }
}

impl FromStr for PublicKey {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_address())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_address())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_address())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Extended public key exchanged between contacts (key + chain code)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExtendedPublicKey {
    key: PublicKey,
    chain_code: [u8; CHAIN_CODE_LEN],
}

impl ExtendedPublicKey {
    pub fn new(key: PublicKey, chain_code: [u8; CHAIN_CODE_LEN]) -> Self {
        Self { key, chain_code }
    }

    /// Parse the base58 form
    pub fn parse(s: &str) -> AuthzResult<Self> {
        let payload = decode_with_checksum(s, PUBLIC_KEY_LEN + CHAIN_CODE_LEN)?;
        let key = PublicKey::from_bytes(&payload[..PUBLIC_KEY_LEN])?;

        let mut chain_code = [0u8; CHAIN_CODE_LEN];
        chain_code.copy_from_slice(&payload[PUBLIC_KEY_LEN..]);

        Ok(Self { key, chain_code })
    }

    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(PUBLIC_KEY_LEN + CHAIN_CODE_LEN);
        payload.extend_from_slice(self.key.as_bytes());
        payload.extend_from_slice(&self.chain_code);
        encode_with_checksum(&payload)
    }
}

impl fmt::Display for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtendedPublicKey({})", self.encode())
    }
}

impl Serialize for ExtendedPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for ExtendedPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
