use std::{collections::HashMap, sync::RwLock};

use rand::RngCore;
use serde::Deserialize;
use tracing::info;

use crate::error::CryptoError;

pub const KEY_BYTES: usize = 32;

/// A named symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    pub id: String,
    bytes: [u8; KEY_BYTES],
}

impl Key {
    pub fn new(id: impl Into<String>, bytes: [u8; KEY_BYTES]) -> Self {
        Key {
            id: id.into(),
            bytes,
        }
    }

    /// Build a key from raw material, which must be exactly 32 bytes.
    pub fn from_slice(id: impl Into<String>, bytes: &[u8]) -> Result<Self, CryptoError> {
        let id = id.into();
        let bytes = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(id.clone()))?;
        Ok(Key { id, bytes })
    }

    /// Generate a fresh random key.
    pub fn generate(id: impl Into<String>) -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Key::new(id, bytes)
    }

    pub fn bytes(&self) -> &[u8; KEY_BYTES] {
        &self.bytes
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Which keys an algorithm encrypts with and accepts for decryption.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyConfig {
    pub encryption_key_id: String,
    pub decryption_key_ids: Vec<String>,
}

impl KeyConfig {
    pub fn new(encryption_key_id: impl Into<String>) -> Self {
        KeyConfig {
            encryption_key_id: encryption_key_id.into(),
            decryption_key_ids: Vec::new(),
        }
    }

    /// Also accept values encrypted with `key_id`.
    pub fn decrypt_with(mut self, key_id: impl Into<String>) -> Self {
        self.decryption_key_ids.push(key_id.into());
        self
    }
}

/// Where keys are provisioned and loaded from.
pub trait KeyStorage: Send + Sync {
    fn read_key(&self, id: &str) -> Result<Key, CryptoError>;

    fn read_keys(&self) -> Result<Vec<Key>, CryptoError>;

    /// Store new keys. Fails if any id is already taken.
    fn create_keys(&self, keys: &[Key]) -> Result<(), CryptoError>;
}

/// A [`KeyStorage`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    keys: RwLock<HashMap<String, Key>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        MemoryKeyStorage {
            keys: RwLock::new(keys.into_iter().map(|key| (key.id.clone(), key)).collect()),
        }
    }
}

fn poisoned<T>(_: T) -> CryptoError {
    CryptoError::KeyStorage("key storage lock poisoned".to_string())
}

impl KeyStorage for MemoryKeyStorage {
    fn read_key(&self, id: &str) -> Result<Key, CryptoError> {
        self.keys
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| CryptoError::UnknownKey(id.to_string()))
    }

    fn read_keys(&self) -> Result<Vec<Key>, CryptoError> {
        Ok(self.keys.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn create_keys(&self, keys: &[Key]) -> Result<(), CryptoError> {
        let mut stored = self.keys.write().map_err(poisoned)?;
        if let Some(existing) = keys.iter().find(|key| stored.contains_key(&key.id)) {
            return Err(CryptoError::KeyStorage(format!(
                "key {} already exists",
                existing.id
            )));
        }
        for key in keys {
            stored.insert(key.id.clone(), key.clone());
        }
        Ok(())
    }
}

/// Make sure the encryption key named by `config` exists, creating it if not.
pub fn ensure_key(config: &KeyConfig, storage: &dyn KeyStorage) -> Result<(), CryptoError> {
    match storage.read_key(&config.encryption_key_id) {
        Ok(_) => Ok(()),
        Err(CryptoError::UnknownKey(_)) => {
            info!(key_id = %config.encryption_key_id, "creating encryption key");
            storage.create_keys(&[Key::generate(config.encryption_key_id.clone())])
        }
        Err(err) => Err(err),
    }
}
