use crate::location::{Address, ADDRESS_SIZE};
use crate::tx::{Signature, Transaction};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("transaction carries no signature")]
    MissingSignature,

    #[error("transaction signature does not verify: {0}")]
    InvalidSignature(secp256k1::Error),
}

impl From<secp256k1::Error> for SignerError {
    fn from(err: secp256k1::Error) -> Self {
        SignerError::InvalidSignature(err)
    }
}

/// Recovers and produces transaction signatures for one chain id. Signing is
/// over the transaction's signature hash, which itself commits to the chain
/// id, so signatures do not replay across chains.
pub struct Signer {
    chain_id: u64,
    secp: Secp256k1<All>,
}

impl Signer {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, secp: Secp256k1::new() }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Recovers the signing address of a signed transaction.
    pub fn recover(&self, tx: &Transaction) -> Result<Address, SignerError> {
        let sig = tx.raw_signature().ok_or(SignerError::MissingSignature)?;
        let recovery_id = RecoveryId::from_i32(sig.odd_y_parity as i32)?;
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&sig.r);
        compact[32..].copy_from_slice(&sig.s);
        let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)?;
        let message = Message::from_digest(tx.signature_hash().as_bytes());
        let public_key = self.secp.recover_ecdsa(&message, &recoverable)?;
        Ok(address_of(&public_key))
    }

    /// Returns a copy of `tx` carrying a signature by `secret_key`.
    pub fn sign(&self, tx: &Transaction, secret_key: &SecretKey) -> Transaction {
        let message = Message::from_digest(tx.signature_hash().as_bytes());
        let (recovery_id, compact) = self.secp.sign_ecdsa_recoverable(&message, secret_key).serialize_compact();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        tx.with_signature(Signature { odd_y_parity: recovery_id.to_i32() != 0, r, s })
    }

    /// The address a secret key signs as.
    pub fn address_for(&self, secret_key: &SecretKey) -> Address {
        address_of(&PublicKey::from_secret_key(&self.secp, secret_key))
    }
}

fn address_of(public_key: &PublicKey) -> Address {
    let digest = Keccak256::digest(&public_key.serialize_uncompressed()[1..]);
    Address::from_slice(&digest[digest.len() - ADDRESS_SIZE..])
}
