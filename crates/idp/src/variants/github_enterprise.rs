use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{OptionChanges, Options},
    provider::{GitHubProvider, Provider, require_active, reveal},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.github_enterprise.added")]
#[serde(rename_all = "camelCase")]
pub struct GitHubEnterpriseIdpAdded {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: CryptoValue,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(flatten)]
    pub options: Options,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.github_enterprise.changed")]
#[serde(rename_all = "camelCase")]
pub struct GitHubEnterpriseIdpChanged {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<CryptoValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GitHubEnterpriseIdpChange {
    Name(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    AuthorizationEndpoint(String),
    TokenEndpoint(String),
    UserEndpoint(String),
    Scopes(Vec<String>),
    Options(OptionChanges),
}

impl GitHubEnterpriseIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<GitHubEnterpriseIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = GitHubEnterpriseIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                GitHubEnterpriseIdpChange::Name(v) => event.name = Some(v),
                GitHubEnterpriseIdpChange::ClientId(v) => event.client_id = Some(v),
                GitHubEnterpriseIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                GitHubEnterpriseIdpChange::AuthorizationEndpoint(v) => event.authorization_endpoint = Some(v),
                GitHubEnterpriseIdpChange::TokenEndpoint(v) => event.token_endpoint = Some(v),
                GitHubEnterpriseIdpChange::UserEndpoint(v) => event.user_endpoint = Some(v),
                GitHubEnterpriseIdpChange::Scopes(v) => event.scopes = Some(v),
                GitHubEnterpriseIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum GitHubEnterpriseIdpEvent {
    Added(GitHubEnterpriseIdpAdded),
    Changed(GitHubEnterpriseIdpChanged),
    Removed(IdpRemoved),
}

/// Desired state of a GitHub Enterprise Server provider.
///
/// An empty `client_secret` on update keeps the stored secret.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitHubEnterpriseIdpConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    pub scopes: Vec<String>,
    pub options: Options,
}

impl GitHubEnterpriseIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        required("client id", &self.client_id)?;
        required("authorization endpoint", &self.authorization_endpoint)?;
        required("token endpoint", &self.token_endpoint)?;
        required("user endpoint", &self.user_endpoint)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<GitHubEnterpriseIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(GitHubEnterpriseIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            client_secret: encrypt(self.client_secret.as_bytes(), alg)?,
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            user_endpoint: self.user_endpoint.clone(),
            scopes: self.scopes.clone(),
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct GitHubEnterpriseIdpWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: Option<CryptoValue>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    pub scopes: Vec<String>,
    pub options: Options,
    pub state: IdpState,
}

impl GitHubEnterpriseIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        GitHubEnterpriseIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: GitHubEnterpriseIdpAdded) {
        self.name = e.name;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.authorization_endpoint = e.authorization_endpoint;
        self.token_endpoint = e.token_endpoint;
        self.user_endpoint = e.user_endpoint;
        self.scopes = e.scopes;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: GitHubEnterpriseIdpChanged) {
        if let Some(v) = e.name {
            self.name = v;
        }
        if let Some(v) = e.client_id {
            self.client_id = v;
        }
        if let Some(v) = e.client_secret {
            self.client_secret = Some(v);
        }
        if let Some(v) = e.authorization_endpoint {
            self.authorization_endpoint = v;
        }
        if let Some(v) = e.token_endpoint {
            self.token_endpoint = v;
        }
        if let Some(v) = e.user_endpoint {
            self.user_endpoint = v;
        }
        if let Some(v) = e.scopes {
            self.scopes = v;
        }
        self.options.reduce_changes(&e.option_changes);
    }

    /// The field changes needed to reach `desired`.
    pub fn new_changes(
        &self,
        desired: &GitHubEnterpriseIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<GitHubEnterpriseIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, GitHubEnterpriseIdpChange::ClientSecret)?
            .field(&self.client_id, &desired.client_id, GitHubEnterpriseIdpChange::ClientId)
            .field(&self.name, &desired.name, GitHubEnterpriseIdpChange::Name)
            .field(
                &self.authorization_endpoint,
                &desired.authorization_endpoint,
                GitHubEnterpriseIdpChange::AuthorizationEndpoint,
            )
            .field(&self.token_endpoint, &desired.token_endpoint, GitHubEnterpriseIdpChange::TokenEndpoint)
            .field(&self.user_endpoint, &desired.user_endpoint, GitHubEnterpriseIdpChange::UserEndpoint)
            .field(&self.scopes, &desired.scopes, GitHubEnterpriseIdpChange::Scopes)
            .nested(self.options.changes(&desired.options), GitHubEnterpriseIdpChange::Options)
            .into_vec())
    }

    /// The changed event reaching `desired`, or `None` if nothing differs.
    pub fn changed_event(
        &self,
        desired: &GitHubEnterpriseIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<GitHubEnterpriseIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(GitHubEnterpriseIdpChanged::new(&self.id, changes)?))
    }

    /// Materialize as a GitHub provider talking to the enterprise endpoints.
    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        Ok(Provider::GitHub(GitHubProvider {
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            user_endpoint: self.user_endpoint.clone(),
            scopes: self.scopes.clone(),
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for GitHubEnterpriseIdpWriteModel {
    type Events = GitHubEnterpriseIdpEvent;
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

    fn apply(&mut self, event: GitHubEnterpriseIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            GitHubEnterpriseIdpEvent::Added(e) => self.reduce_added(e),
            GitHubEnterpriseIdpEvent::Changed(e) => self.reduce_changed(e),
            GitHubEnterpriseIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::testing::{Stream, alg, owner, replay};

    fn config() -> GitHubEnterpriseIdpConfig {
        GitHubEnterpriseIdpConfig {
            name: "ghe".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            authorization_endpoint: "https://ghe.example.com/login/oauth/authorize".to_string(),
            token_endpoint: "https://ghe.example.com/login/oauth/access_token".to_string(),
            user_endpoint: "https://ghe.example.com/api/v3/user".to_string(),
            scopes: Vec::new(),
            options: Options::default(),
        }
    }

    #[test]
    fn materializes_with_enterprise_endpoints() {
        let alg = alg();
        let mut model = GitHubEnterpriseIdpWriteModel::new(&owner(), "idp-1");
        replay(
            &mut model,
            Stream::new("idp-1")
                .then(config().added_event("idp-1", &alg).unwrap())
                .build(),
        );

        let Provider::GitHub(provider) = model.to_provider("https://cb", &alg).unwrap() else {
            panic!("expected a github provider");
        };
        assert_eq!(provider.user_endpoint, "https://ghe.example.com/api/v3/user");
    }

    #[test]
    fn endpoint_change_is_single_entry() {
        let alg = alg();
        let mut model = GitHubEnterpriseIdpWriteModel::new(&owner(), "idp-1");
        replay(
            &mut model,
            Stream::new("idp-1")
                .then(config().added_event("idp-1", &alg).unwrap())
                .build(),
        );

        let desired = GitHubEnterpriseIdpConfig {
            client_secret: String::new(),
            token_endpoint: "https://ghe2.example.com/token".to_string(),
            ..config()
        };
        assert_eq!(
            model.new_changes(&desired, &alg).unwrap(),
            [GitHubEnterpriseIdpChange::TokenEndpoint(
                "https://ghe2.example.com/token".to_string()
            )]
        );
    }
}
