use crate::{
    error::CryptoError,
    value::{CryptoType, CryptoValue},
};

/// A symmetric cipher backed by a catalog of keys.
///
/// Implementations are read-only after construction and safe to share.
pub trait EncryptionAlgorithm: Send + Sync {
    /// Identifier stored alongside every value this algorithm produces.
    fn algorithm(&self) -> &str;

    /// The key new values are encrypted with.
    fn encryption_key_id(&self) -> &str;

    /// Every key id this algorithm can decrypt with.
    fn decryption_key_ids(&self) -> Vec<String>;

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, ciphertext: &[u8], key_id: &str) -> Result<Vec<u8>, CryptoError>;
}

/// Encrypt `plaintext` into a storable value.
pub fn encrypt(
    plaintext: &[u8],
    alg: &(impl EncryptionAlgorithm + ?Sized),
) -> Result<CryptoValue, CryptoError> {
    Ok(CryptoValue {
        crypto_type: CryptoType::Encryption,
        algorithm: alg.algorithm().to_string(),
        key_id: alg.encryption_key_id().to_string(),
        crypted: alg.encrypt(plaintext)?,
    })
}

/// Decrypt a stored value, checking that `alg` is able to.
pub fn decrypt(
    value: &CryptoValue,
    alg: &(impl EncryptionAlgorithm + ?Sized),
) -> Result<Vec<u8>, CryptoError> {
    if value.algorithm != alg.algorithm() {
        return Err(CryptoError::AlgorithmMismatch {
            expected: alg.algorithm().to_string(),
            actual: value.algorithm.clone(),
        });
    }
    if !alg.decryption_key_ids().contains(&value.key_id) {
        return Err(CryptoError::UnknownKey(value.key_id.clone()));
    }
    alg.decrypt(&value.crypted, &value.key_id)
}

/// Decrypt a stored value holding UTF-8 text.
pub fn decrypt_string(
    value: &CryptoValue,
    alg: &(impl EncryptionAlgorithm + ?Sized),
) -> Result<String, CryptoError> {
    String::from_utf8(decrypt(value, alg)?).map_err(|_| CryptoError::DecryptFailed)
}
