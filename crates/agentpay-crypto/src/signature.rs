//! Mandate signing and verification
//!
//! The signed message is the canonical payload concatenated with a
//! canonicalized `{algorithm, nonce, timestamp}` block, so a replayed
//! signature cannot be moved onto a different payload or a different moment
//! in time.

use crate::{canonical_bytes, CryptoError, CryptoResult, KeyManager};
use agentpay_types::{Mandate, SignatureEnvelope, MANDATE_ALGORITHM};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::RngCore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Nonce size in bytes (hex-encoded in the envelope)
const NONCE_LEN: usize = 16;

/// Tuning for mandate signatures
#[derive(Debug, Clone)]
pub struct MandateCryptoConfig {
    /// Signatures older than this are rejected as replays
    pub max_signature_age: Duration,
}

impl Default for MandateCryptoConfig {
    fn default() -> Self {
        Self {
            max_signature_age: Duration::hours(24),
        }
    }
}

/// Signs and verifies mandate payloads
pub struct MandateCrypto {
    keys: Arc<KeyManager>,
    config: MandateCryptoConfig,
}

impl MandateCrypto {
    /// Create with default configuration
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self::with_config(keys, MandateCryptoConfig::default())
    }

    /// Create with explicit configuration
    pub fn with_config(keys: Arc<KeyManager>, config: MandateCryptoConfig) -> Self {
        Self { keys, config }
    }

    /// The key manager backing this signer
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Sign a payload with the given key, producing a detached envelope
    pub fn sign(&self, payload: &Value, key_id: &str) -> CryptoResult<SignatureEnvelope> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = hex::encode(nonce_bytes);
        let timestamp = Utc::now();

        let message = signing_message(payload, &nonce, &timestamp)?;
        let digest = Sha256::digest(&message);
        let raw = self.keys.sign_digest(key_id, &digest)?;

        Ok(SignatureEnvelope {
            signature: BASE64.encode(raw),
            algorithm: MANDATE_ALGORITHM.to_string(),
            key_id: key_id.to_string(),
            timestamp,
            nonce,
        })
    }

    /// Verify a detached envelope over a payload.
    ///
    /// `Ok(false)` means the bytes simply do not match; every structural
    /// failure (wrong algorithm, replay window, unknown or expired key,
    /// undecodable signature) is a typed error.
    pub fn verify(&self, payload: &Value, sig: &SignatureEnvelope) -> CryptoResult<bool> {
        if sig.algorithm != MANDATE_ALGORITHM {
            return Err(CryptoError::AlgorithmMismatch {
                expected: MANDATE_ALGORITHM.to_string(),
                actual: sig.algorithm.clone(),
            });
        }

        let age = Utc::now() - sig.timestamp;
        if age > self.config.max_signature_age {
            return Err(CryptoError::SignatureExpired {
                age_secs: age.num_seconds(),
                max_age_secs: self.config.max_signature_age.num_seconds(),
            });
        }

        let raw = BASE64
            .decode(&sig.signature)
            .map_err(|e| CryptoError::VerificationFailed(format!("signature is not base64: {e}")))?;

        let message = signing_message(payload, &sig.nonce, &sig.timestamp)?;
        let digest = Sha256::digest(&message);
        self.keys.verify_digest(&sig.key_id, &digest, &raw)
    }

    /// Full usability check for a mandate: signature verifies AND status is
    /// active AND the mandate's own expiry has not passed. The three checks
    /// are independent and all required.
    pub fn verify_mandate(&self, mandate: &Mandate) -> CryptoResult<bool> {
        Ok(self.verify(&mandate.payload, &mandate.signature)? && mandate.is_active())
    }
}

/// The exact byte sequence that gets digested and signed
fn signing_message(
    payload: &Value,
    nonce: &str,
    timestamp: &DateTime<Utc>,
) -> CryptoResult<Vec<u8>> {
    let mut message = canonical_bytes(payload)?;
    let metadata = json!({
        "algorithm": MANDATE_ALGORITHM,
        "nonce": nonce,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
    });
    message.extend(canonical_bytes(&metadata)?);
    Ok(message)
}
