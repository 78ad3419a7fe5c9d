use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{OptionChanges, Options},
    provider::{GOOGLE_ISSUER, OidcProvider, Provider, require_active, reveal},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.google.added")]
#[serde(rename_all = "camelCase")]
pub struct GoogleIdpAdded {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: CryptoValue,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(flatten)]
    pub options: Options,
}

/// An OIDC provider reclassified as Google.
#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oidc.migrated.google")]
pub struct OidcIdpMigratedGoogle {
    #[serde(flatten)]
    pub added: GoogleIdpAdded,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.google.changed")]
#[serde(rename_all = "camelCase")]
pub struct GoogleIdpChanged {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<CryptoValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GoogleIdpChange {
    Name(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    Scopes(Vec<String>),
    Options(OptionChanges),
}

impl GoogleIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<GoogleIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = GoogleIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                GoogleIdpChange::Name(v) => event.name = Some(v),
                GoogleIdpChange::ClientId(v) => event.client_id = Some(v),
                GoogleIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                GoogleIdpChange::Scopes(v) => event.scopes = Some(v),
                GoogleIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum GoogleIdpEvent {
    Added(GoogleIdpAdded),
    MigratedFromOidc(OidcIdpMigratedGoogle),
    Changed(GoogleIdpChanged),
    Removed(IdpRemoved),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleIdpConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub options: Options,
}

impl GoogleIdpConfig {
    /// A Google provider may be unnamed; it is then shown as "Google".
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("client id", &self.client_id)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<GoogleIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(GoogleIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            client_secret: encrypt(self.client_secret.as_bytes(), alg)?,
            scopes: self.scopes.clone(),
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct GoogleIdpWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: Option<CryptoValue>,
    pub scopes: Vec<String>,
    pub options: Options,
    pub state: IdpState,
}

impl GoogleIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        GoogleIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: GoogleIdpAdded) {
        self.name = e.name;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.scopes = e.scopes;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: GoogleIdpChanged) {
        if let Some(v) = e.name {
            self.name = v;
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
        self.options.reduce_changes(&e.option_changes);
    }

    pub fn new_changes(
        &self,
        desired: &GoogleIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<GoogleIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, GoogleIdpChange::ClientSecret)?
            .field(&self.name, &desired.name, GoogleIdpChange::Name)
            .field(&self.client_id, &desired.client_id, GoogleIdpChange::ClientId)
            .field(&self.scopes, &desired.scopes, GoogleIdpChange::Scopes)
            .nested(self.options.changes(&desired.options), GoogleIdpChange::Options)
            .into_vec())
    }

    pub fn changed_event(
        &self,
        desired: &GoogleIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<GoogleIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(GoogleIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        let name = if self.name.is_empty() { "Google" } else { self.name.as_str() };
        Ok(Provider::Google(OidcProvider {
            name: name.to_string(),
            issuer: GOOGLE_ISSUER.to_string(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            scopes: self.scopes.clone(),
            select_account: true,
            id_token_mapping: false,
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for GoogleIdpWriteModel {
    type Events = GoogleIdpEvent;
    type LegacyEvents = NoEvents;

    fn write_model(&self) -> &WriteModel {
        &self.base
    }

    fn write_model_mut(&mut self) -> &mut WriteModel {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        stream_query(self, self.scope)
    }

    fn apply(&mut self, event: GoogleIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            GoogleIdpEvent::Added(e) => self.reduce_added(e),
            GoogleIdpEvent::MigratedFromOidc(e) => self.reduce_added(e.added),
            GoogleIdpEvent::Changed(e) => self.reduce_changed(e),
            GoogleIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::testing::{Stream, alg, owner, replay};

    fn config() -> GoogleIdpConfig {
        GoogleIdpConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn migrated_stream_materializes_with_google_issuer() {
        let alg = alg();
        let mut model = GoogleIdpWriteModel::new(&owner(), "idp-1");
        let events = Stream::new("idp-1")
            .then(OidcIdpMigratedGoogle {
                added: config().added_event("idp-1", &alg).unwrap(),
            })
            .build();
        replay(&mut model, events);

        let Provider::Google(provider) = model.to_provider("https://cb", &alg).unwrap() else {
            panic!("expected a google provider");
        };
        assert_eq!(provider.issuer, "https://accounts.google.com");
        assert_eq!(provider.name, "Google");
        assert_eq!(provider.scopes, ["openid", "email"]);
    }

    #[test]
    fn removed_google_fails_materialization() {
        let alg = alg();
        let mut model = GoogleIdpWriteModel::new(&owner(), "idp-1");
        let events = Stream::new("idp-1")
            .then(config().added_event("idp-1", &alg).unwrap())
            .then(IdpRemoved { id: "idp-1".to_string() })
            .build();
        replay(&mut model, events);

        assert_eq!(model.state, IdpState::Removed);
        assert!(model.to_provider("https://cb", &alg).is_err());
    }
}
