//! Core types for the smart wallet core
//!
//! Addresses and amounts use `alloy_primitives`; owner keys are secp256k1
//! keys from `k256`, and identities are Ethereum-style addresses derived
//! from the uncompressed public key.

use crate::{Error, Result};
use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// ECDSA signature (r, s, v) as carried in `UserOperation::signature`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component (32 bytes)
    pub r: [u8; 32],
    /// S component (32 bytes)
    pub s: [u8; 32],
    /// Recovery ID (0 or 1)
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Get v value (27 or 28)
    pub fn v(&self) -> u8 {
        self.recovery_id + 27
    }

    /// Encode as r || s || v (65 bytes)
    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        bytes.push(self.v());
        bytes
    }

    /// Decode from r || s || v, accepting v as 0/1 or 27/28
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(Error::InvalidSignature(format!(
                "expected 65 bytes, got {}",
                bytes.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);

        let recovery_id = match bytes[64] {
            0 | 1 => bytes[64],
            27 | 28 => bytes[64] - 27,
            v => {
                return Err(Error::InvalidSignature(format!("invalid v value {}", v)));
            }
        };

        Ok(Self { r, s, recovery_id })
    }

    /// Recover the signer address for a 32-byte prehash
    pub fn recover(&self, prehash: &B256) -> Result<Address> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);

        let signature = EcdsaSignature::from_slice(&rs)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.recovery_id)
            .ok_or_else(|| Error::InvalidSignature("invalid recovery id".into()))?;

        let key = VerifyingKey::recover_from_prehash(prehash.as_slice(), &signature, recovery_id)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;

        Ok(address_from_verifying_key(&key))
    }
}

/// Owner key for a wallet
///
/// The wallet stores only the owner's address; the key signs operation
/// hashes off-ledger.
#[derive(Clone)]
pub struct OwnerKey {
    signing_key: SigningKey,
}

impl OwnerKey {
    /// Generate a fresh random key
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Load a key from 32 secret bytes
    pub fn from_slice(secret: &[u8]) -> Result<Self> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Load a key from a hex string, with or without `0x`
    pub fn from_hex(secret: &str) -> Result<Self> {
        let secret = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(secret)?;
        Self::from_slice(&bytes)
    }

    /// Ethereum address of this key
    pub fn address(&self) -> Address {
        address_from_verifying_key(self.signing_key.verifying_key())
    }

    /// Sign a raw 32-byte prehash
    pub fn sign_prehash(&self, prehash: &B256) -> Result<Signature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash.as_slice())
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(Signature::new(r, s, recovery_id.to_byte()))
    }

    /// Sign a message hash with the `personal_sign` prefix applied
    pub fn sign_message_hash(&self, hash: &B256) -> Result<Signature> {
        self.sign_prehash(&eth_signed_message_hash(hash))
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerKey")
            .field("address", &self.address())
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the Ethereum address of a public key
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    // Skip the 0x04 prefix
    let hash = keccak256_hash(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// `keccak256("\x19Ethereum Signed Message:\n32" || hash)`
pub fn eth_signed_message_hash(hash: &B256) -> B256 {
    let mut hasher = Keccak::v256();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.as_slice());
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    B256::from(out)
}

/// Compute Keccak256 hash of data
pub fn keccak256_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

/// Keccak256 as a `B256`
pub fn keccak256(data: &[u8]) -> B256 {
    B256::from(keccak256_hash(data))
}

/// Left-pad an address to a 32-byte ABI word
pub(crate) fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    word
}
