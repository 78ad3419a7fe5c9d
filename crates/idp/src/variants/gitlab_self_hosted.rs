use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{OptionChanges, Options},
    provider::{GitLabProvider, Provider, require_active, reveal},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.gitlab_self_hosted.added")]
#[serde(rename_all = "camelCase")]
pub struct GitLabSelfHostedIdpAdded {
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: CryptoValue,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(flatten)]
    pub options: Options,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.gitlab_self_hosted.changed")]
#[serde(rename_all = "camelCase")]
pub struct GitLabSelfHostedIdpChanged {
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
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GitLabSelfHostedIdpChange {
    Name(String),
    Issuer(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    Scopes(Vec<String>),
    Options(OptionChanges),
}

impl GitLabSelfHostedIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<GitLabSelfHostedIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = GitLabSelfHostedIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                GitLabSelfHostedIdpChange::Name(v) => event.name = Some(v),
                GitLabSelfHostedIdpChange::Issuer(v) => event.issuer = Some(v),
                GitLabSelfHostedIdpChange::ClientId(v) => event.client_id = Some(v),
                GitLabSelfHostedIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                GitLabSelfHostedIdpChange::Scopes(v) => event.scopes = Some(v),
                GitLabSelfHostedIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum GitLabSelfHostedIdpEvent {
    Added(GitLabSelfHostedIdpAdded),
    Changed(GitLabSelfHostedIdpChanged),
    Removed(IdpRemoved),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitLabSelfHostedIdpConfig {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub options: Options,
}

impl GitLabSelfHostedIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        required("issuer", &self.issuer)?;
        required("client id", &self.client_id)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<GitLabSelfHostedIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(GitLabSelfHostedIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            client_id: self.client_id.clone(),
            client_secret: encrypt(self.client_secret.as_bytes(), alg)?,
            scopes: self.scopes.clone(),
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct GitLabSelfHostedIdpWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<CryptoValue>,
    pub scopes: Vec<String>,
    pub options: Options,
    pub state: IdpState,
}

impl GitLabSelfHostedIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        GitLabSelfHostedIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: GitLabSelfHostedIdpAdded) {
        self.name = e.name;
        self.issuer = e.issuer;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.scopes = e.scopes;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: GitLabSelfHostedIdpChanged) {
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
        self.options.reduce_changes(&e.option_changes);
    }

    pub fn new_changes(
        &self,
        desired: &GitLabSelfHostedIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<GitLabSelfHostedIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, GitLabSelfHostedIdpChange::ClientSecret)?
            .field(&self.name, &desired.name, GitLabSelfHostedIdpChange::Name)
            .field(&self.issuer, &desired.issuer, GitLabSelfHostedIdpChange::Issuer)
            .field(&self.client_id, &desired.client_id, GitLabSelfHostedIdpChange::ClientId)
            .field(&self.scopes, &desired.scopes, GitLabSelfHostedIdpChange::Scopes)
            .nested(self.options.changes(&desired.options), GitLabSelfHostedIdpChange::Options)
            .into_vec())
    }

    pub fn changed_event(
        &self,
        desired: &GitLabSelfHostedIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<GitLabSelfHostedIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(GitLabSelfHostedIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        Ok(Provider::GitLab(GitLabProvider {
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            scopes: self.scopes.clone(),
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for GitLabSelfHostedIdpWriteModel {
    type Events = GitLabSelfHostedIdpEvent;
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

    fn apply(&mut self, event: GitLabSelfHostedIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            GitLabSelfHostedIdpEvent::Added(e) => self.reduce_added(e),
            GitLabSelfHostedIdpEvent::Changed(e) => self.reduce_changed(e),
            GitLabSelfHostedIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}
