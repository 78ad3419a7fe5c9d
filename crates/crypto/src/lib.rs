//! Encryption of secrets at rest.
//!
//! Secrets are stored in events as [`CryptoValue`]s: the ciphertext plus
//! the algorithm and key id needed to decrypt it later. Keys live in a
//! [`KeyStorage`] and are looked up by id, so the encryption key can be
//! rotated while older values stay readable.

pub mod aes;
pub mod algorithm;
pub mod error;
pub mod key;
pub mod value;

pub use aes::AesCrypto;
pub use algorithm::{EncryptionAlgorithm, decrypt, decrypt_string, encrypt};
pub use error::CryptoError;
pub use key::{Key, KeyConfig, KeyStorage, MemoryKeyStorage, ensure_key};
pub use value::{CryptoType, CryptoValue};
