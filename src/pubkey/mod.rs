use std::{fmt, str::FromStr};

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

pub const PUBKEY_LEN: usize = 32;

/// 32-byte identity used for callers, boss accounts and record addresses.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pubkey([u8; PUBKEY_LEN]);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PubkeyError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("pubkey must be 32 bytes, got {0}")]
    Length(usize),
}

impl Pubkey {
    pub const fn new(bytes: [u8; PUBKEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LEN] {
        &self.0
    }

    pub fn to_verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }
}

impl From<VerifyingKey> for Pubkey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl From<&SigningKey> for Pubkey {
    fn from(key: &SigningKey) -> Self {
        key.verifying_key().into()
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 4 bytes only
        write!(f, "Pubkey({})", &hex::encode(self.0)[..8])
    }
}

impl FromStr for Pubkey {
    type Err = PubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| PubkeyError::Hex(e.to_string()))?;
        let arr: [u8; PUBKEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PubkeyError::Length(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl Serialize for Pubkey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

/// Deterministic record address for `seed` under `program_id`.
///
/// Addresses are hashes, never valid signing keys in practice, so a record
/// address cannot sign an invocation.
pub fn derive_address(seed: &[u8], program_id: &Pubkey) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(b"somos-record");
    hasher.update((seed.len() as u64).to_le_bytes());
    hasher.update(seed);
    hasher.update(program_id.as_bytes());
    Pubkey(hasher.finalize().into())
}
