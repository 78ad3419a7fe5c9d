use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{OptionChanges, Options},
    provider::{
        GITHUB_AUTHORIZATION_ENDPOINT, GITHUB_TOKEN_ENDPOINT, GITHUB_USER_ENDPOINT, GitHubProvider,
        Provider, require_active, reveal,
    },
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.github.added")]
#[serde(rename_all = "camelCase")]
pub struct GitHubIdpAdded {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: CryptoValue,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(flatten)]
    pub options: Options,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.github.changed")]
#[serde(rename_all = "camelCase")]
pub struct GitHubIdpChanged {
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
pub enum GitHubIdpChange {
    Name(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    Scopes(Vec<String>),
    Options(OptionChanges),
}

impl GitHubIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<GitHubIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = GitHubIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                GitHubIdpChange::Name(v) => event.name = Some(v),
                GitHubIdpChange::ClientId(v) => event.client_id = Some(v),
                GitHubIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                GitHubIdpChange::Scopes(v) => event.scopes = Some(v),
                GitHubIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum GitHubIdpEvent {
    Added(GitHubIdpAdded),
    Changed(GitHubIdpChanged),
    Removed(IdpRemoved),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitHubIdpConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub options: Options,
}

impl GitHubIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("client id", &self.client_id)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<GitHubIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(GitHubIdpAdded {
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
pub struct GitHubIdpWriteModel {
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

impl GitHubIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        GitHubIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: GitHubIdpAdded) {
        self.name = e.name;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.scopes = e.scopes;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: GitHubIdpChanged) {
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
        desired: &GitHubIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<GitHubIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, GitHubIdpChange::ClientSecret)?
            .field(&self.name, &desired.name, GitHubIdpChange::Name)
            .field(&self.client_id, &desired.client_id, GitHubIdpChange::ClientId)
            .field(&self.scopes, &desired.scopes, GitHubIdpChange::Scopes)
            .nested(self.options.changes(&desired.options), GitHubIdpChange::Options)
            .into_vec())
    }

    pub fn changed_event(
        &self,
        desired: &GitHubIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<GitHubIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(GitHubIdpChanged::new(&self.id, changes)?))
    }

    /// Materialize against github.com.
    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        let name = if self.name.is_empty() { "GitHub" } else { self.name.as_str() };
        Ok(Provider::GitHub(GitHubProvider {
            name: name.to_string(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            authorization_endpoint: GITHUB_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: GITHUB_TOKEN_ENDPOINT.to_string(),
            user_endpoint: GITHUB_USER_ENDPOINT.to_string(),
            scopes: self.scopes.clone(),
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for GitHubIdpWriteModel {
    type Events = GitHubIdpEvent;
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

    fn apply(&mut self, event: GitHubIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            GitHubIdpEvent::Added(e) => self.reduce_added(e),
            GitHubIdpEvent::Changed(e) => self.reduce_changed(e),
            GitHubIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}
