use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::{
        IdpRemoved, LegacyConfigAdded, LegacyConfigChanged, LegacyConfigRemoved,
        LegacyOidcConfigAdded, LegacyOidcConfigChanged,
    },
    options::{OptionChanges, Options},
    provider::{OidcProvider, Provider, require_active, reveal},
    variants::{
        azure_ad::OidcIdpMigratedAzureAd, ensure_changes, google::OidcIdpMigratedGoogle, required,
        stream_query,
    },
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oidc.added")]
#[serde(rename_all = "camelCase")]
pub struct OidcIdpAdded {
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: CryptoValue,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub is_id_token_mapping: bool,
    #[serde(flatten)]
    pub options: Options,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oidc.changed")]
#[serde(rename_all = "camelCase")]
pub struct OidcIdpChanged {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<CryptoValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_id_token_mapping: Option<bool>,
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OidcIdpChange {
    Name(String),
    Issuer(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    Scopes(Vec<String>),
    IsIdTokenMapping(bool),
    Options(OptionChanges),
}

impl OidcIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<OidcIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = OidcIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                OidcIdpChange::Name(v) => event.name = Some(v),
                OidcIdpChange::Issuer(v) => event.issuer = Some(v),
                OidcIdpChange::ClientId(v) => event.client_id = Some(v),
                OidcIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                OidcIdpChange::Scopes(v) => event.scopes = Some(v),
                OidcIdpChange::IsIdTokenMapping(v) => event.is_id_token_mapping = Some(v),
                OidcIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum OidcIdpEvent {
    Added(OidcIdpAdded),
    Changed(OidcIdpChanged),
    MigratedAzureAd(OidcIdpMigratedAzureAd),
    MigratedGoogle(OidcIdpMigratedGoogle),
    Removed(IdpRemoved),
}

/// `idp.config.*` and `idp.oidc.config.*` events written before providers
/// had kind-specific events.
#[derive(Debug, EventSet)]
pub enum LegacyOidcEvent {
    ConfigAdded(LegacyConfigAdded),
    ConfigChanged(LegacyConfigChanged),
    ConfigRemoved(LegacyConfigRemoved),
    OidcConfigAdded(LegacyOidcConfigAdded),
    OidcConfigChanged(LegacyOidcConfigChanged),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OidcIdpConfig {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub is_id_token_mapping: bool,
    pub options: Options,
}

impl OidcIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        required("issuer", &self.issuer)?;
        required("client id", &self.client_id)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<OidcIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(OidcIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            client_id: self.client_id.clone(),
            client_secret: encrypt(self.client_secret.as_bytes(), alg)?,
            scopes: self.scopes.clone(),
            is_id_token_mapping: self.is_id_token_mapping,
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct OidcIdpWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<CryptoValue>,
    pub scopes: Vec<String>,
    pub is_id_token_mapping: bool,
    pub options: Options,
    pub state: IdpState,
}

impl OidcIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        OidcIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: OidcIdpAdded) {
        self.name = e.name;
        self.issuer = e.issuer;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.scopes = e.scopes;
        self.is_id_token_mapping = e.is_id_token_mapping;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: OidcIdpChanged) {
        if let Some(v) = e.name {
            self.name = v;
        }
        if let Some(v) = e.issuer {
            self.issuer = v;
        }
        if let Some(v) = e.client_id {
            self.client_id = v;
        }
        if let Some(v) = e.client_secret {
            self.client_secret = Some(v);
        }
        if let Some(v) = e.scopes {
            self.scopes = v;
        }
        if let Some(v) = e.is_id_token_mapping {
            self.is_id_token_mapping = v;
        }
        self.options.reduce_changes(&e.option_changes);
    }

    pub fn new_changes(
        &self,
        desired: &OidcIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<OidcIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, OidcIdpChange::ClientSecret)?
            .field(&self.client_id, &desired.client_id, OidcIdpChange::ClientId)
            .field(&self.name, &desired.name, OidcIdpChange::Name)
            .field(&self.issuer, &desired.issuer, OidcIdpChange::Issuer)
            .field(&self.scopes, &desired.scopes, OidcIdpChange::Scopes)
            .field(
                &self.is_id_token_mapping,
                &desired.is_id_token_mapping,
                OidcIdpChange::IsIdTokenMapping,
            )
            .nested(self.options.changes(&desired.options), OidcIdpChange::Options)
            .into_vec())
    }

    pub fn changed_event(
        &self,
        desired: &OidcIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<OidcIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(OidcIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        Ok(Provider::Oidc(OidcProvider {
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            scopes: self.scopes.clone(),
            select_account: true,
            id_token_mapping: self.is_id_token_mapping,
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for OidcIdpWriteModel {
    type Events = OidcIdpEvent;
    type LegacyEvents = LegacyOidcEvent;

    fn write_model(&self) -> &WriteModel {
        &self.base
    }

    fn write_model_mut(&mut self) -> &mut WriteModel {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        stream_query(self, self.scope)
    }

    fn apply(&mut self, event: OidcIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            OidcIdpEvent::Added(e) => self.reduce_added(e),
            OidcIdpEvent::Changed(e) => self.reduce_changed(e),
            OidcIdpEvent::MigratedAzureAd(_) | OidcIdpEvent::MigratedGoogle(_) => {
                self.state = self.state.transition(IdpState::Migrated)
            }
            OidcIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }

    fn apply_legacy(&mut self, event: LegacyOidcEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            LegacyOidcEvent::ConfigAdded(e) => {
                self.name = e.name;
                self.options.is_auto_creation = e.auto_register;
                self.state = self.state.transition(IdpState::Active);
            }
            LegacyOidcEvent::ConfigChanged(e) => {
                if let Some(v) = e.name {
                    self.name = v;
                }
                if let Some(v) = e.auto_register {
                    self.options.is_auto_creation = v;
                }
            }
            LegacyOidcEvent::ConfigRemoved(_) => {
                self.state = self.state.transition(IdpState::Removed)
            }
            LegacyOidcEvent::OidcConfigAdded(e) => {
                self.issuer = e.issuer;
                self.client_id = e.client_id;
                self.client_secret = e.client_secret;
                self.scopes = e.scopes;
            }
            LegacyOidcEvent::OidcConfigChanged(e) => {
                if let Some(v) = e.issuer {
                    self.issuer = v;
                }
                if let Some(v) = e.client_id {
                    self.client_id = v;
                }
                if let Some(v) = e.client_secret {
                    self.client_secret = Some(v);
                }
                if let Some(v) = e.scopes {
                    self.scopes = v;
                }
            }
        }
    }
}
