use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{OptionChanges, Options},
    provider::{GITLAB_ISSUER, GitLabProvider, Provider, require_active, reveal},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.gitlab.added")]
#[serde(rename_all = "camelCase")]
pub struct GitLabIdpAdded {
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
#[event_type("idp.gitlab.changed")]
#[serde(rename_all = "camelCase")]
pub struct GitLabIdpChanged {
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
pub enum GitLabIdpChange {
    Name(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    Scopes(Vec<String>),
    Options(OptionChanges),
}

impl GitLabIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<GitLabIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = GitLabIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                GitLabIdpChange::Name(v) => event.name = Some(v),
                GitLabIdpChange::ClientId(v) => event.client_id = Some(v),
                GitLabIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                GitLabIdpChange::Scopes(v) => event.scopes = Some(v),
                GitLabIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum GitLabIdpEvent {
    Added(GitLabIdpAdded),
    Changed(GitLabIdpChanged),
    Removed(IdpRemoved),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitLabIdpConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub options: Options,
}

impl GitLabIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("client id", &self.client_id)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<GitLabIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(GitLabIdpAdded {
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
pub struct GitLabIdpWriteModel {
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

impl GitLabIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        GitLabIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: GitLabIdpAdded) {
        self.name = e.name;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.scopes = e.scopes;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: GitLabIdpChanged) {
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
        desired: &GitLabIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<GitLabIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, GitLabIdpChange::ClientSecret)?
            .field(&self.name, &desired.name, GitLabIdpChange::Name)
            .field(&self.client_id, &desired.client_id, GitLabIdpChange::ClientId)
            .field(&self.scopes, &desired.scopes, GitLabIdpChange::Scopes)
            .nested(self.options.changes(&desired.options), GitLabIdpChange::Options)
            .into_vec())
    }

    pub fn changed_event(
        &self,
        desired: &GitLabIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<GitLabIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(GitLabIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        let name = if self.name.is_empty() { "GitLab" } else { self.name.as_str() };
        Ok(Provider::GitLab(GitLabProvider {
            name: name.to_string(),
            issuer: GITLAB_ISSUER.to_string(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            scopes: self.scopes.clone(),
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for GitLabIdpWriteModel {
    type Events = GitLabIdpEvent;
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

    fn apply(&mut self, event: GitLabIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            GitLabIdpEvent::Added(e) => self.reduce_added(e),
            GitLabIdpEvent::Changed(e) => self.reduce_changed(e),
            GitLabIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}
