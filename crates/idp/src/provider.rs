//! Runtime federation clients built from reduced write models.
//!
//! A [`Provider`] carries everything a protocol client needs to start a
//! login flow, including the decrypted secret. It is never persisted.

use std::{fmt, time::Duration};

use idpstore_crypto::{CryptoError, CryptoValue, EncryptionAlgorithm, decrypt_string};

use crate::{domain::IdpState, error::ValidationError, options::Options};

pub const GITHUB_AUTHORIZATION_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_USER_ENDPOINT: &str = "https://api.github.com/user";
pub const GITLAB_ISSUER: &str = "https://gitlab.com";
pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";
pub const AZURE_AD_DEFAULT_TENANT: &str = "common";
const AZURE_AD_LOGIN: &str = "https://login.microsoftonline.com";
const MICROSOFT_GRAPH_ME: &str = "https://graph.microsoft.com/v1.0/me";

/// A decrypted secret. Its `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        SecretString(secret.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

/// Account capabilities handed to the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    pub creation_allowed: bool,
    pub linking_allowed: bool,
    pub auto_creation: bool,
    pub auto_update: bool,
}

impl From<&Options> for ProviderOptions {
    fn from(options: &Options) -> Self {
        ProviderOptions {
            creation_allowed: options.is_creation_allowed,
            linking_allowed: options.is_linking_allowed,
            auto_creation: options.is_auto_creation,
            auto_update: options.is_auto_update,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OAuthProvider {
    pub name: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    pub scopes: Vec<String>,
    /// Claim of the user info response holding the external user id.
    pub id_attribute: String,
    pub options: ProviderOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OidcProvider {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
    pub scopes: Vec<String>,
    /// Prompt the user to pick an account on every login.
    pub select_account: bool,
    /// Map user info from the id token instead of the userinfo endpoint.
    pub id_token_mapping: bool,
    pub options: ProviderOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JwtProvider {
    pub name: String,
    pub issuer: String,
    pub jwt_endpoint: String,
    pub keys_endpoint: String,
    pub header_name: String,
    pub options: ProviderOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AzureAdProvider {
    pub name: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
    pub scopes: Vec<String>,
    pub tenant: String,
    pub email_verified: bool,
    pub options: ProviderOptions,
}

impl AzureAdProvider {
    pub fn authorization_endpoint(&self) -> String {
        format!("{AZURE_AD_LOGIN}/{}/oauth2/v2.0/authorize", self.tenant)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{AZURE_AD_LOGIN}/{}/oauth2/v2.0/token", self.tenant)
    }

    pub fn user_endpoint(&self) -> &'static str {
        MICROSOFT_GRAPH_ME
    }
}

/// GitHub and GitHub Enterprise Server.
#[derive(Clone, Debug, PartialEq)]
pub struct GitHubProvider {
    pub name: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    pub scopes: Vec<String>,
    pub options: ProviderOptions,
}

/// gitlab.com and self-hosted GitLab instances.
#[derive(Clone, Debug, PartialEq)]
pub struct GitLabProvider {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
    pub scopes: Vec<String>,
    pub options: ProviderOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LdapProvider {
    pub name: String,
    pub servers: Vec<String>,
    pub start_tls: bool,
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_password: SecretString,
    pub user_base: String,
    pub user_object_classes: Vec<String>,
    pub user_filters: Vec<String>,
    pub timeout: Duration,
    pub callback_url: String,
    /// Attribute mappings replacing the client defaults, by user field.
    pub attribute_overrides: Vec<(&'static str, String)>,
    pub options: ProviderOptions,
}

/// A materialized identity provider.
#[derive(Clone, Debug, PartialEq)]
pub enum Provider {
    OAuth(OAuthProvider),
    Oidc(OidcProvider),
    Jwt(JwtProvider),
    AzureAd(AzureAdProvider),
    GitHub(GitHubProvider),
    GitLab(GitLabProvider),
    Google(OidcProvider),
    Ldap(LdapProvider),
}

impl Provider {
    pub fn name(&self) -> &str {
        match self {
            Provider::OAuth(p) => &p.name,
            Provider::Oidc(p) | Provider::Google(p) => &p.name,
            Provider::Jwt(p) => &p.name,
            Provider::AzureAd(p) => &p.name,
            Provider::GitHub(p) => &p.name,
            Provider::GitLab(p) => &p.name,
            Provider::Ldap(p) => &p.name,
        }
    }

    pub fn options(&self) -> ProviderOptions {
        match self {
            Provider::OAuth(p) => p.options,
            Provider::Oidc(p) | Provider::Google(p) => p.options,
            Provider::Jwt(p) => p.options,
            Provider::AzureAd(p) => p.options,
            Provider::GitHub(p) => p.options,
            Provider::GitLab(p) => p.options,
            Provider::Ldap(p) => p.options,
        }
    }
}

/// Only active providers may be materialized.
pub(crate) fn require_active(state: IdpState, id: &str) -> Result<(), ValidationError> {
    if state.is_active() {
        return Ok(());
    }
    Err(ValidationError::precondition_failed(format!(
        "identity provider {id} is not active ({state:?})"
    )))
}

pub(crate) fn reveal(
    secret: Option<&CryptoValue>,
    alg: &dyn EncryptionAlgorithm,
) -> Result<SecretString, CryptoError> {
    let secret = secret.ok_or(CryptoError::MissingValue)?;
    decrypt_string(secret, alg).map(SecretString)
}
