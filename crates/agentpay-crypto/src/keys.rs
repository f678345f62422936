//! Key custody for AgentPay
//!
//! The [`KeyManager`] is a keyed map of RSA key pairs with one designated
//! "current" signing key, guarded by a single lock. Verification-only keys
//! (imported public PEM) live in the same map without a private half.

use crate::{CryptoError, CryptoResult};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;

/// SHA-256 digest length in bytes
const SHA256_LEN: usize = 32;

/// Minimum acceptable RSA modulus size
pub const MIN_RSA_BITS: usize = 2048;

/// An RSA key pair; the private half is present only where signing authority
/// is held.
#[derive(Clone, Debug)]
pub struct KeyPair {
    key_id: String,
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl KeyPair {
    /// Generate a new RSA key pair of at least [`MIN_RSA_BITS`] bits
    pub fn generate(key_id: impl Into<String>, bits: usize) -> CryptoResult<Self> {
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "modulus must be at least {MIN_RSA_BITS} bits, got {bits}"
            )));
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        Ok(Self {
            key_id: key_id.into(),
            public,
            private: Some(private),
            created_at: Utc::now(),
            expires_at: None,
        })
    }

    /// Verification-only pair from a public key
    fn verification_only(key_id: String, public: RsaPublicKey) -> Self {
        Self {
            key_id,
            public,
            private: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// The key's identifier
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The public half
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Whether this pair holds signing authority
    pub fn can_sign(&self) -> bool {
        self.private.is_some()
    }

    /// When the pair was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Optional expiry of the key itself
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Set an expiry on the key
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the key's own expiry has passed
    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Utc::now() >= at)
    }

    /// Public half as PEM
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
    }

    fn ensure_usable(&self) -> CryptoResult<()> {
        if let Some(at) = self.expires_at {
            if Utc::now() >= at {
                return Err(CryptoError::KeyExpired {
                    key_id: self.key_id.clone(),
                    expired_at: at.to_rfc3339(),
                });
            }
        }
        Ok(())
    }

    /// Maximum PSS salt for this modulus: len(modulus) - len(digest) - 2
    fn max_salt_len(&self) -> usize {
        self.public.size() - SHA256_LEN - 2
    }
}

/// Summary of a stored key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key_id: String,
    pub can_sign: bool,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

struct KeyStore {
    keys: HashMap<String, KeyPair>,
    current: Option<String>,
}

/// Custody of signing keys. Private keys never leave the manager; signing
/// happens through [`KeyManager::sign_digest`].
pub struct KeyManager {
    store: RwLock<KeyStore>,
}

impl KeyManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            store: RwLock::new(KeyStore {
                keys: HashMap::new(),
                current: None,
            }),
        }
    }

    /// Generate and store a new key pair. The first key generated becomes
    /// the current signing key.
    pub fn generate(&self, key_id: impl Into<String>, bits: usize) -> CryptoResult<KeyPair> {
        let pair = KeyPair::generate(key_id, bits)?;
        let mut store = self.store.write().map_err(|_| CryptoError::LockPoisoned)?;
        if store.current.is_none() {
            store.current = Some(pair.key_id.clone());
        }
        store.keys.insert(pair.key_id.clone(), pair.clone());
        Ok(pair)
    }

    /// The current signing key, if one is designated
    pub fn current(&self) -> CryptoResult<Option<KeyPair>> {
        let store = self.store.read().map_err(|_| CryptoError::LockPoisoned)?;
        Ok(store
            .current
            .as_ref()
            .and_then(|id| store.keys.get(id))
            .cloned())
    }

    /// Look up a key by ID
    pub fn get(&self, key_id: &str) -> CryptoResult<Option<KeyPair>> {
        let store = self.store.read().map_err(|_| CryptoError::LockPoisoned)?;
        Ok(store.keys.get(key_id).cloned())
    }

    /// Designate an existing signing-capable key as current
    pub fn set_current(&self, key_id: &str) -> CryptoResult<()> {
        let mut store = self.store.write().map_err(|_| CryptoError::LockPoisoned)?;
        let pair = store
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        if !pair.can_sign() {
            return Err(CryptoError::SigningFailed(format!(
                "key {key_id} has no private half"
            )));
        }
        store.current = Some(key_id.to_string());
        Ok(())
    }

    /// Export the public half of a key as PEM
    pub fn export_public_pem(&self, key_id: &str) -> CryptoResult<String> {
        self.get(key_id)?
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?
            .public_key_pem()
    }

    /// Import a public PEM as a verification-only key
    pub fn import_public_pem(&self, pem: &str, key_id: impl Into<String>) -> CryptoResult<()> {
        let public = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        let key_id = key_id.into();
        let pair = KeyPair::verification_only(key_id.clone(), public);
        self.store
            .write()
            .map_err(|_| CryptoError::LockPoisoned)?
            .keys
            .insert(key_id, pair);
        Ok(())
    }

    /// Export a private key as PKCS#8 PEM, encrypted when a passphrase is
    /// given. This is the only way private material leaves the manager.
    pub fn export_private_pem(
        &self,
        key_id: &str,
        passphrase: Option<&str>,
    ) -> CryptoResult<String> {
        let pair = self
            .get(key_id)?
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        let private = pair
            .private
            .as_ref()
            .ok_or_else(|| CryptoError::SigningFailed(format!("key {key_id} has no private half")))?;

        let pem = match passphrase {
            Some(pass) => private
                .to_pkcs8_encrypted_pem(&mut OsRng, pass.as_bytes(), LineEnding::LF)
                .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?,
            None => private
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?,
        };
        Ok(pem.to_string())
    }

    /// Delete a key. Fails if it is the current signing key.
    pub fn delete(&self, key_id: &str) -> CryptoResult<()> {
        let mut store = self.store.write().map_err(|_| CryptoError::LockPoisoned)?;
        if store.current.as_deref() == Some(key_id) {
            return Err(CryptoError::KeyInUse(key_id.to_string()));
        }
        store
            .keys
            .remove(key_id)
            .map(|_| ())
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))
    }

    /// Summaries of all stored keys
    pub fn list(&self) -> CryptoResult<Vec<KeyInfo>> {
        let store = self.store.read().map_err(|_| CryptoError::LockPoisoned)?;
        Ok(store
            .keys
            .values()
            .map(|pair| KeyInfo {
                key_id: pair.key_id.clone(),
                can_sign: pair.can_sign(),
                is_current: store.current.as_deref() == Some(pair.key_id.as_str()),
                created_at: pair.created_at,
                expires_at: pair.expires_at,
            })
            .collect())
    }

    /// Sign a SHA-256 digest with RSA-PSS (MGF1/SHA-256, maximum salt).
    /// The private key never leaves the manager.
    pub fn sign_digest(&self, key_id: &str, digest: &[u8]) -> CryptoResult<Vec<u8>> {
        let pair = self
            .get(key_id)?
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        pair.ensure_usable()?;
        let private = pair
            .private
            .as_ref()
            .ok_or_else(|| CryptoError::SigningFailed(format!("key {key_id} has no private half")))?;

        private
            .sign_with_rng(
                &mut OsRng,
                Pss::new_with_salt::<Sha256>(pair.max_salt_len()),
                digest,
            )
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))
    }

    /// Verify an RSA-PSS signature over a SHA-256 digest.
    /// `Ok(false)` means the signature simply does not match.
    pub fn verify_digest(
        &self,
        key_id: &str,
        digest: &[u8],
        signature: &[u8],
    ) -> CryptoResult<bool> {
        let pair = self
            .get(key_id)?
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;
        pair.ensure_usable()?;

        Ok(pair
            .public
            .verify(
                Pss::new_with_salt::<Sha256>(pair.max_salt_len()),
                digest,
                signature,
            )
            .is_ok())
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest;

    #[test]
    fn test_undersized_modulus_rejected() {
        let err = KeyPair::generate("weak", 1024).unwrap_err();
        assert!(matches!(err, CryptoError::KeyGeneration(_)));
    }

    #[test]
    fn test_first_key_becomes_current() {
        let manager = KeyManager::new();
        manager.generate("key-1", 2048).unwrap();
        assert_eq!(manager.current().unwrap().unwrap().key_id(), "key-1");

        // A second key does not displace the current pointer
        manager.generate("key-2", 2048).unwrap();
        assert_eq!(manager.current().unwrap().unwrap().key_id(), "key-1");

        manager.set_current("key-2").unwrap();
        assert_eq!(manager.current().unwrap().unwrap().key_id(), "key-2");
    }

    #[test]
    fn test_sign_and_verify_digest() {
        let manager = KeyManager::new();
        manager.generate("key-1", 2048).unwrap();

        let digest = Sha256::digest(b"canonical payload").to_vec();
        let sig = manager.sign_digest("key-1", &digest).unwrap();
        assert!(manager.verify_digest("key-1", &digest, &sig).unwrap());

        let other = Sha256::digest(b"different payload").to_vec();
        assert!(!manager.verify_digest("key-1", &other, &sig).unwrap());
    }

    #[test]
    fn test_delete_current_key_fails() {
        let manager = KeyManager::new();
        manager.generate("key-1", 2048).unwrap();
        assert!(matches!(
            manager.delete("key-1"),
            Err(CryptoError::KeyInUse(_))
        ));

        manager.generate("key-2", 2048).unwrap();
        manager.delete("key-2").unwrap();
        assert!(manager.get("key-2").unwrap().is_none());
    }

    #[test]
    fn test_public_pem_round_trip() {
        let signer = KeyManager::new();
        signer.generate("key-1", 2048).unwrap();
        let pem = signer.export_public_pem("key-1").unwrap();
        assert!(pem.contains("BEGIN PUBLIC KEY"));

        // A verifier that only holds the public half can verify but not sign
        let verifier = KeyManager::new();
        verifier.import_public_pem(&pem, "key-1").unwrap();
        assert!(!verifier.get("key-1").unwrap().unwrap().can_sign());

        let digest = Sha256::digest(b"message").to_vec();
        let sig = signer.sign_digest("key-1", &digest).unwrap();
        assert!(verifier.verify_digest("key-1", &digest, &sig).unwrap());
        assert!(matches!(
            verifier.sign_digest("key-1", &digest),
            Err(CryptoError::SigningFailed(_))
        ));
    }

    #[test]
    fn test_encrypted_private_export() {
        let manager = KeyManager::new();
        manager.generate("key-1", 2048).unwrap();

        let plain = manager.export_private_pem("key-1", None).unwrap();
        assert!(plain.contains("BEGIN PRIVATE KEY"));

        let encrypted = manager
            .export_private_pem("key-1", Some("hunter2"))
            .unwrap();
        assert!(encrypted.contains("BEGIN ENCRYPTED PRIVATE KEY"));
    }

    #[test]
    fn test_expired_key_rejected() {
        let manager = KeyManager::new();
        let pair = KeyPair::generate("key-1", 2048)
            .unwrap()
            .with_expiry(Utc::now() - chrono::Duration::hours(1));
        manager
            .store
            .write()
            .unwrap()
            .keys
            .insert("key-1".into(), pair);

        let digest = Sha256::digest(b"message").to_vec();
        assert!(matches!(
            manager.sign_digest("key-1", &digest),
            Err(CryptoError::KeyExpired { .. })
        ));
        assert!(matches!(
            manager.verify_digest("key-1", &digest, &[0u8; 256]),
            Err(CryptoError::KeyExpired { .. })
        ));
    }

    #[test]
    fn test_unknown_key() {
        let manager = KeyManager::new();
        assert!(matches!(
            manager.sign_digest("ghost", &[0u8; 32]),
            Err(CryptoError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_poisoned_lock_surfaces_as_error() {
        let manager = std::sync::Arc::new(KeyManager::new());

        let poisoner = std::sync::Arc::clone(&manager);
        let handle = std::thread::spawn(move || {
            let _guard = poisoner.store.write().unwrap();
            panic!("poison the key store");
        });
        assert!(handle.join().is_err());

        assert!(matches!(
            manager.current(),
            Err(CryptoError::LockPoisoned)
        ));
        assert!(matches!(
            manager.get("key-1"),
            Err(CryptoError::LockPoisoned)
        ));
        assert!(matches!(
            manager.sign_digest("key-1", &[0u8; 32]),
            Err(CryptoError::LockPoisoned)
        ));
    }
}
