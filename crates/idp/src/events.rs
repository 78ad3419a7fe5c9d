//! Events shared by every provider kind, and the pre-refactor
//! `idp.config.*` shapes still found in historical streams.
//!
//! Kind-specific Added/Changed events live next to their write model in
//! [`variants`](crate::variants).

use idpstore_crypto::CryptoValue;
use idpstore_eventstore::Event;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.removed")]
#[serde(rename_all = "camelCase")]
pub struct IdpRemoved {
    pub id: String,
}

/// Protocol discriminator of a legacy config.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyConfigType {
    #[default]
    Oidc,
    Saml,
    Jwt,
}

#[derive(Clone, Debug, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.config.added")]
#[serde(rename_all = "camelCase")]
pub struct LegacyConfigAdded {
    pub idp_config_id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub typ: LegacyConfigType,
    #[serde(default)]
    pub auto_register: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.config.changed")]
#[serde(rename_all = "camelCase")]
pub struct LegacyConfigChanged {
    pub idp_config_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_register: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.config.removed")]
#[serde(rename_all = "camelCase")]
pub struct LegacyConfigRemoved {
    pub idp_config_id: String,
}

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oidc.config.added")]
#[serde(rename_all = "camelCase")]
pub struct LegacyOidcConfigAdded {
    pub idp_config_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<CryptoValue>,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oidc.config.changed")]
#[serde(rename_all = "camelCase")]
pub struct LegacyOidcConfigChanged {
    pub idp_config_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<CryptoValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.jwt.config.added")]
#[serde(rename_all = "camelCase")]
pub struct LegacyJwtConfigAdded {
    pub idp_config_id: String,
    #[serde(default)]
    pub jwt_endpoint: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub keys_endpoint: String,
    #[serde(default)]
    pub header_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.jwt.config.changed")]
#[serde(rename_all = "camelCase")]
pub struct LegacyJwtConfigChanged {
    pub idp_config_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
}
