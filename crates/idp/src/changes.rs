use idpstore_crypto::{CryptoError, CryptoValue, EncryptionAlgorithm, encrypt};

/// A composite delta that is only worth persisting when something changed.
pub trait Delta {
    fn is_zero(&self) -> bool;
}

/// The minimal list of field changes between stored and desired state.
///
/// Built using the builder pattern:
///
/// ```rust,ignore
/// let changes = ChangeSet::new()
///     .secret(&desired.client_secret, alg, OAuthIdpChange::ClientSecret)?
///     .field(&self.name, &desired.name, OAuthIdpChange::Name)
///     .nested(self.options.changes(&desired.options), OAuthIdpChange::Options)
///     .into_vec();
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeSet<C> {
    changes: Vec<C>,
}

impl<C> Default for ChangeSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ChangeSet<C> {
    pub fn new() -> Self {
        ChangeSet {
            changes: Vec::new(),
        }
    }

    /// Record `desired` if it differs from `current`.
    pub fn field<T>(mut self, current: &T, desired: &T, change: impl FnOnce(T) -> C) -> Self
    where
        T: PartialEq + Clone,
    {
        if current != desired {
            self.changes.push(change(desired.clone()));
        }
        self
    }

    /// Encrypt and record a new secret.
    ///
    /// Stored secrets can't be compared with plaintext, so any non-empty
    /// secret is recorded. An empty one keeps the stored secret.
    pub fn secret(
        mut self,
        plaintext: &str,
        alg: &dyn EncryptionAlgorithm,
        change: impl FnOnce(CryptoValue) -> C,
    ) -> Result<Self, CryptoError> {
        if !plaintext.is_empty() {
            self.changes.push(change(encrypt(plaintext.as_bytes(), alg)?));
        }
        Ok(self)
    }

    /// Record a bundle delta unless it is zero.
    pub fn nested<D: Delta>(mut self, delta: D, change: impl FnOnce(D) -> C) -> Self {
        if !delta.is_zero() {
            self.changes.push(change(delta));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, C> {
        self.changes.iter()
    }

    pub fn into_vec(self) -> Vec<C> {
        self.changes
    }
}

#[cfg(test)]
mod tests {
    use idpstore_crypto::{AesCrypto, Key, KeyConfig, MemoryKeyStorage, decrypt_string};

    use super::*;
    use crate::options::{OptionChanges, Options};

    #[derive(Debug, PartialEq)]
    enum Change {
        Name(String),
        Scopes(Vec<String>),
        Secret(CryptoValue),
        Options(OptionChanges),
    }

    fn alg() -> AesCrypto {
        let storage = MemoryKeyStorage::with_keys([Key::generate("idp")]);
        AesCrypto::new(&KeyConfig::new("idp"), &storage).unwrap()
    }

    #[test]
    fn equal_fields_record_nothing() {
        let changes = ChangeSet::new()
            .field(&"a".to_string(), &"a".to_string(), Change::Name)
            .field(&vec!["openid".to_string()], &vec!["openid".to_string()], Change::Scopes)
            .nested(Options::default().changes(&Options::default()), Change::Options);
        assert!(changes.is_empty());
    }

    #[test]
    fn scopes_compare_in_order() {
        let current = vec!["openid".to_string(), "email".to_string()];
        let desired = vec!["email".to_string(), "openid".to_string()];
        let changes = ChangeSet::new().field(&current, &desired, Change::Scopes);
        assert_eq!(changes.into_vec(), [Change::Scopes(desired)]);
    }

    #[test]
    fn non_empty_secret_is_always_recorded() {
        let alg = alg();
        let changes = ChangeSet::new()
            .secret("s3cret", &alg, Change::Secret)
            .unwrap()
            .into_vec();

        let [Change::Secret(value)] = changes.as_slice() else {
            panic!("expected a single secret change, got {changes:?}");
        };
        assert_eq!(decrypt_string(value, &alg).unwrap(), "s3cret");
    }

    #[test]
    fn empty_secret_keeps_stored_one() {
        let changes = ChangeSet::<Change>::new().secret("", &alg(), Change::Secret).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn nested_delta_is_one_entry() {
        let desired = Options {
            is_creation_allowed: true,
            is_auto_update: true,
            ..Default::default()
        };
        let changes = ChangeSet::new().nested(Options::default().changes(&desired), Change::Options);
        assert_eq!(changes.len(), 1);
    }
}
