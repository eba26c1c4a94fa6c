use ed25519_dalek::{Signature, Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::escrow::EscrowItem;
use crate::pubkey::Pubkey;
use crate::settlement::{FeeRate, Lamports};

/// One transition request together with the accounts it names.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    InitializeLedger {
        user: Pubkey,
        ledger: Pubkey,
        #[serde(with = "crate::instruction::serde_bytes")]
        seed: Vec<u8>,
        supply: u64,
        price: Lamports,
        resale_fee: FeeRate,
    },
    PurchasePrimary {
        user: Pubkey,
        boss: Pubkey,
        ledger: Pubkey,
    },
    InitializeEscrow {
        user: Pubkey,
        escrow: Pubkey,
        ledger: Pubkey,
        #[serde(with = "crate::instruction::serde_bytes")]
        seed: Vec<u8>,
    },
    SubmitToEscrow {
        seller: Pubkey,
        escrow: Pubkey,
        ledger: Pubkey,
        price: Lamports,
    },
    PurchaseSecondary {
        buyer: Pubkey,
        seller: Pubkey,
        boss: Pubkey,
        escrow: Pubkey,
        ledger: Pubkey,
        item: EscrowItem,
    },
}

impl Instruction {
    /// The account that must have signed the invocation.
    pub fn signer(&self) -> &Pubkey {
        match self {
            Instruction::InitializeLedger { user, .. }
            | Instruction::PurchasePrimary { user, .. }
            | Instruction::InitializeEscrow { user, .. } => user,
            Instruction::SubmitToEscrow { seller, .. } => seller,
            Instruction::PurchaseSecondary { buyer, .. } => buyer,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Instruction::InitializeLedger { .. } => "initialize_ledger",
            Instruction::PurchasePrimary { .. } => "purchase_primary",
            Instruction::InitializeEscrow { .. } => "initialize_escrow",
            Instruction::SubmitToEscrow { .. } => "submit_to_escrow",
            Instruction::PurchaseSecondary { .. } => "purchase_secondary",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invocation {
    pub program_id: Pubkey,
    pub nonce: u64,
    pub instruction: Instruction,
}

impl Invocation {
    pub fn digest(&self) -> Result<[u8; 32], SignatureError> {
        let body = serde_json::to_vec(&self.instruction)
            .map_err(|e| SignatureError::Encoding(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(b"somos-invocation");
        hasher.update(self.program_id.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(&body);
        Ok(hasher.finalize().into())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedInvocation {
    pub invocation: Invocation,
    pub signer: Pubkey,
    #[serde(with = "crate::instruction::serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedInvocation {
    pub fn sign(key: &SigningKey, invocation: Invocation) -> Result<Self, SignatureError> {
        let digest = invocation.digest()?;
        let signature = key.sign(&digest);
        Ok(Self {
            invocation,
            signer: Pubkey::from(key),
            signature: signature.to_bytes().to_vec(),
        })
    }

    /// Checks the signature and returns the digest that was signed.
    pub fn verify(&self) -> Result<[u8; 32], SignatureError> {
        let key = self
            .signer
            .to_verifying_key()
            .ok_or(SignatureError::MalformedKey(self.signer))?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| SignatureError::MalformedSignature)?;
        let digest = self.invocation.digest()?;
        key.verify_strict(&digest, &signature)
            .map_err(|_| SignatureError::InvalidSignature(self.signer))?;
        Ok(digest)
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signer {0} is not a valid ed25519 key")]
    MalformedKey(Pubkey),
    #[error("malformed signature")]
    MalformedSignature,
    #[error("invalid signature from {0}")]
    InvalidSignature(Pubkey),
    #[error("invocation encoding failed: {0}")]
    Encoding(String),
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
