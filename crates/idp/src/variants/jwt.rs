use idpstore_crypto::EncryptionAlgorithm;
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::{
        IdpRemoved, LegacyConfigAdded, LegacyConfigChanged, LegacyConfigRemoved,
        LegacyJwtConfigAdded, LegacyJwtConfigChanged,
    },
    options::{OptionChanges, Options},
    provider::{JwtProvider, Provider, require_active},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.jwt.added")]
#[serde(rename_all = "camelCase")]
pub struct JwtIdpAdded {
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub jwt_endpoint: String,
    pub keys_endpoint: String,
    pub header_name: String,
    #[serde(flatten)]
    pub options: Options,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Event, Serialize, Deserialize)]
#[event_type("idp.jwt.changed")]
#[serde(rename_all = "camelCase")]
pub struct JwtIdpChanged {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JwtIdpChange {
    Name(String),
    Issuer(String),
    JwtEndpoint(String),
    KeysEndpoint(String),
    HeaderName(String),
    Options(OptionChanges),
}

impl JwtIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<JwtIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = JwtIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                JwtIdpChange::Name(v) => event.name = Some(v),
                JwtIdpChange::Issuer(v) => event.issuer = Some(v),
                JwtIdpChange::JwtEndpoint(v) => event.jwt_endpoint = Some(v),
                JwtIdpChange::KeysEndpoint(v) => event.keys_endpoint = Some(v),
                JwtIdpChange::HeaderName(v) => event.header_name = Some(v),
                JwtIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum JwtIdpEvent {
    Added(JwtIdpAdded),
    Changed(JwtIdpChanged),
    Removed(IdpRemoved),
}

#[derive(Debug, EventSet)]
pub enum LegacyJwtEvent {
    ConfigAdded(LegacyConfigAdded),
    ConfigChanged(LegacyConfigChanged),
    ConfigRemoved(LegacyConfigRemoved),
    JwtConfigAdded(LegacyJwtConfigAdded),
    JwtConfigChanged(LegacyJwtConfigChanged),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtIdpConfig {
    pub name: String,
    pub issuer: String,
    pub jwt_endpoint: String,
    pub keys_endpoint: String,
    /// Request header carrying the token.
    pub header_name: String,
    pub options: Options,
}

impl JwtIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        required("issuer", &self.issuer)?;
        required("jwt endpoint", &self.jwt_endpoint)?;
        required("keys endpoint", &self.keys_endpoint)
    }

    /// JWT providers hold no secret, so `alg` is unused.
    pub fn added_event(&self, id: &str, _alg: &dyn EncryptionAlgorithm) -> Result<JwtIdpAdded, Error> {
        Ok(JwtIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            jwt_endpoint: self.jwt_endpoint.clone(),
            keys_endpoint: self.keys_endpoint.clone(),
            header_name: self.header_name.clone(),
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct JwtIdpWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub jwt_endpoint: String,
    pub keys_endpoint: String,
    pub header_name: String,
    pub options: Options,
    pub state: IdpState,
}

impl JwtIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        JwtIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: JwtIdpAdded) {
        self.name = e.name;
        self.issuer = e.issuer;
        self.jwt_endpoint = e.jwt_endpoint;
        self.keys_endpoint = e.keys_endpoint;
        self.header_name = e.header_name;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: JwtIdpChanged) {
        if let Some(v) = e.name {
            self.name = v;
        }
        if let Some(v) = e.issuer {
            self.issuer = v;
        }
        if let Some(v) = e.jwt_endpoint {
            self.jwt_endpoint = v;
        }
        if let Some(v) = e.keys_endpoint {
            self.keys_endpoint = v;
        }
        if let Some(v) = e.header_name {
            self.header_name = v;
        }
        self.options.reduce_changes(&e.option_changes);
    }

    pub fn new_changes(&self, desired: &JwtIdpConfig) -> Vec<JwtIdpChange> {
        ChangeSet::new()
            .field(&self.name, &desired.name, JwtIdpChange::Name)
            .field(&self.issuer, &desired.issuer, JwtIdpChange::Issuer)
            .field(&self.jwt_endpoint, &desired.jwt_endpoint, JwtIdpChange::JwtEndpoint)
            .field(&self.keys_endpoint, &desired.keys_endpoint, JwtIdpChange::KeysEndpoint)
            .field(&self.header_name, &desired.header_name, JwtIdpChange::HeaderName)
            .nested(self.options.changes(&desired.options), JwtIdpChange::Options)
            .into_vec()
    }

    pub fn changed_event(
        &self,
        desired: &JwtIdpConfig,
        _alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<JwtIdpChanged>, Error> {
        let changes = self.new_changes(desired);
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(JwtIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, _callback_url: &str, _alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        Ok(Provider::Jwt(JwtProvider {
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            jwt_endpoint: self.jwt_endpoint.clone(),
            keys_endpoint: self.keys_endpoint.clone(),
            header_name: self.header_name.clone(),
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for JwtIdpWriteModel {
    type Events = JwtIdpEvent;
    type LegacyEvents = LegacyJwtEvent;

    fn write_model(&self) -> &WriteModel {
        &self.base
    }

    fn write_model_mut(&mut self) -> &mut WriteModel {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        stream_query(self, self.scope)
    }

    fn apply(&mut self, event: JwtIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            JwtIdpEvent::Added(e) => self.reduce_added(e),
            JwtIdpEvent::Changed(e) => self.reduce_changed(e),
            JwtIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }

    fn apply_legacy(&mut self, event: LegacyJwtEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            LegacyJwtEvent::ConfigAdded(e) => {
                self.name = e.name;
                self.options.is_auto_creation = e.auto_register;
                self.state = self.state.transition(IdpState::Active);
            }
            LegacyJwtEvent::ConfigChanged(e) => {
                if let Some(v) = e.name {
                    self.name = v;
                }
                if let Some(v) = e.auto_register {
                    self.options.is_auto_creation = v;
                }
            }
            LegacyJwtEvent::ConfigRemoved(_) => {
                self.state = self.state.transition(IdpState::Removed)
            }
            LegacyJwtEvent::JwtConfigAdded(e) => {
                self.issuer = e.issuer;
                self.jwt_endpoint = e.jwt_endpoint;
                self.keys_endpoint = e.keys_endpoint;
                self.header_name = e.header_name;
            }
            LegacyJwtEvent::JwtConfigChanged(e) => {
                if let Some(v) = e.issuer {
                    self.issuer = v;
                }
                if let Some(v) = e.jwt_endpoint {
                    self.jwt_endpoint = v;
                }
                if let Some(v) = e.keys_endpoint {
                    self.keys_endpoint = v;
                }
                if let Some(v) = e.header_name {
                    self.header_name = v;
                }
            }
        }
    }
}
