use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("unknown key id: {0}")]
    UnknownKey(String),
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed")]
    DecryptFailed,
    #[error("invalid key material for key {0}")]
    InvalidKey(String),
    #[error("no encrypted value present")]
    MissingValue,
    #[error("algorithm mismatch: value uses {actual}, expected {expected}")]
    AlgorithmMismatch { expected: String, actual: String },
    #[error("key storage: {0}")]
    KeyStorage(String),
}
