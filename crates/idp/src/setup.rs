//! Bootstrap helpers run once before commands are served.

use idpstore_crypto::{AesCrypto, CryptoError, KeyConfig, KeyStorage, ensure_key};
use tracing::info;

use crate::error::ValidationError;

/// Which machine credentials a setup run asked for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CredentialRequest {
    pub personal_access_token: bool,
    pub machine_key: bool,
}

/// What a setup run actually produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuedCredentials {
    pub personal_access_token: Option<String>,
    pub machine_key: Option<Vec<u8>>,
}

/// Fail when a requested machine credential was not produced.
pub fn check_machine_credentials(
    requested: CredentialRequest,
    issued: &IssuedCredentials,
) -> Result<(), ValidationError> {
    let missing_pat = requested.personal_access_token && issued.personal_access_token.is_none();
    let missing_key = requested.machine_key && issued.machine_key.is_none();
    if missing_pat || missing_key {
        return Err(ValidationError::precondition_failed(
            "credential materialization incomplete",
        ));
    }
    Ok(())
}

/// Provision the IDP encryption key if needed and load it.
pub fn prepare_idp_encryption(
    config: &KeyConfig,
    storage: &dyn KeyStorage,
) -> Result<AesCrypto, CryptoError> {
    ensure_key(config, storage)?;
    let alg = AesCrypto::new(config, storage)?;
    info!(key_id = %config.encryption_key_id, "idp encryption ready");
    Ok(alg)
}
