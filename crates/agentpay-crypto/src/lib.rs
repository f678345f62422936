//! AgentPay Crypto - key custody and mandate signatures
//!
//! **Security Invariant: Private keys NEVER leave the key manager.**
//! Signing happens inside [`KeyManager::sign_digest`]; the only way key
//! material exits is an explicit PEM export, optionally passphrase-encrypted.
//!
//! The signing scheme is RSA-PSS (MGF1/SHA-256, maximum salt length) over a
//! canonicalized JSON payload with a nonce and timestamp bound into the
//! signed message for replay resistance.

pub mod canonical;
pub mod keys;
pub mod signature;

pub use canonical::{canonical_bytes, canonicalize};
pub use keys::{KeyInfo, KeyManager, KeyPair};
pub use signature::{MandateCrypto, MandateCryptoConfig};

use agentpay_types::AgentPayError;
use thiserror::Error;

/// Result type for crypto operations
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Crypto error types
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// Key generation failed or was given bad parameters
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// No key with that ID is known
    #[error("Key {0} not found")]
    KeyNotFound(String),

    /// The key is the current signing key and cannot be deleted
    #[error("Key {0} is the current signing key")]
    KeyInUse(String),

    /// The key's own expiry has passed
    #[error("Key {key_id} expired at {expired_at}")]
    KeyExpired { key_id: String, expired_at: String },

    /// Key bytes/PEM did not parse
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Signing failed (no private half, or RSA failure)
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Verification could not be performed (malformed signature material)
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Signature declares a different algorithm than expected
    #[error("Algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    /// Signature timestamp is older than the replay window
    #[error("Signature is {age_secs}s old, beyond the {max_age_secs}s replay window")]
    SignatureExpired { age_secs: i64, max_age_secs: i64 },

    /// Payload could not be canonicalized
    #[error("Canonicalization failed: {0}")]
    Canonicalization(String),

    /// A lock guarding key state was poisoned
    #[error("Key store lock poisoned")]
    LockPoisoned,
}

impl From<CryptoError> for AgentPayError {
    fn from(e: CryptoError) -> Self {
        AgentPayError::Crypto {
            message: e.to_string(),
        }
    }
}
