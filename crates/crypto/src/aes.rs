use std::collections::HashMap;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use tracing::debug;

use crate::{
    algorithm::EncryptionAlgorithm,
    error::CryptoError,
    key::{Key, KeyConfig, KeyStorage},
};

pub const AES_256_GCM: &str = "aes-256-gcm";

const NONCE_BYTES: usize = 12;

/// AES-256-GCM over a set of named keys.
///
/// Ciphertexts are the random 96-bit nonce followed by the sealed
/// message.
pub struct AesCrypto {
    encryption_key_id: String,
    keys: HashMap<String, Key>,
}

impl AesCrypto {
    /// Load the encryption key and every decryption key named by `config`.
    pub fn new(config: &KeyConfig, storage: &dyn KeyStorage) -> Result<Self, CryptoError> {
        let mut keys = HashMap::new();
        for id in config
            .decryption_key_ids
            .iter()
            .chain(std::iter::once(&config.encryption_key_id))
        {
            let key = storage.read_key(id)?;
            keys.insert(key.id.clone(), key);
        }
        debug!(
            encryption_key_id = %config.encryption_key_id,
            keys = keys.len(),
            "loaded encryption keys"
        );

        Ok(AesCrypto {
            encryption_key_id: config.encryption_key_id.clone(),
            keys,
        })
    }

    fn cipher(&self, key_id: &str) -> Result<Aes256Gcm, CryptoError> {
        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::UnknownKey(key_id.to_string()))?;
        Aes256Gcm::new_from_slice(key.bytes()).map_err(|_| CryptoError::InvalidKey(key_id.to_string()))
    }
}

impl std::fmt::Debug for AesCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCrypto")
            .field("encryption_key_id", &self.encryption_key_id)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EncryptionAlgorithm for AesCrypto {
    fn algorithm(&self) -> &str {
        AES_256_GCM
    }

    fn encryption_key_id(&self) -> &str {
        &self.encryption_key_id
    }

    fn decryption_key_ids(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher(&self.encryption_key_id)?;

        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut out = Vec::with_capacity(NONCE_BYTES + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], key_id: &str) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_BYTES {
            return Err(CryptoError::DecryptFailed);
        }
        let cipher = self.cipher(key_id)?;
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_BYTES);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}
