//! The umbrella write model, dispatching to one of the ten variants.

use idpstore_crypto::EncryptionAlgorithm;
use idpstore_eventstore::prelude::*;
use serde::Deserialize;

use crate::{
    domain::{IdpState, IdpType, Owner},
    error::{Error, ValidationError},
    provider::Provider,
    variants::{
        azure_ad::{AzureAdIdpConfig, AzureAdIdpWriteModel},
        github::{GitHubIdpConfig, GitHubIdpWriteModel},
        github_enterprise::{GitHubEnterpriseIdpConfig, GitHubEnterpriseIdpWriteModel},
        gitlab::{GitLabIdpConfig, GitLabIdpWriteModel},
        gitlab_self_hosted::{GitLabSelfHostedIdpConfig, GitLabSelfHostedIdpWriteModel},
        google::{GoogleIdpConfig, GoogleIdpWriteModel},
        jwt::{JwtIdpConfig, JwtIdpWriteModel},
        ldap::{LdapIdpConfig, LdapIdpWriteModel},
        oauth::{OAuthIdpConfig, OAuthIdpWriteModel},
        oidc::{OidcIdpConfig, OidcIdpWriteModel},
    },
};

/// Desired configuration of an identity provider of any kind.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum IdpConfig {
    #[serde(rename = "oauth")]
    OAuth(OAuthIdpConfig),
    #[serde(rename = "oidc")]
    Oidc(OidcIdpConfig),
    #[serde(rename = "jwt")]
    Jwt(JwtIdpConfig),
    #[serde(rename = "azure_ad")]
    AzureAd(AzureAdIdpConfig),
    #[serde(rename = "github")]
    GitHub(GitHubIdpConfig),
    #[serde(rename = "github_enterprise")]
    GitHubEnterprise(GitHubEnterpriseIdpConfig),
    #[serde(rename = "gitlab")]
    GitLab(GitLabIdpConfig),
    #[serde(rename = "gitlab_self_hosted")]
    GitLabSelfHosted(GitLabSelfHostedIdpConfig),
    #[serde(rename = "google")]
    Google(GoogleIdpConfig),
    #[serde(rename = "ldap")]
    Ldap(LdapIdpConfig),
}

macro_rules! each_config {
    ($value:expr, $config:ident => $body:expr) => {
        match $value {
            IdpConfig::OAuth($config) => $body,
            IdpConfig::Oidc($config) => $body,
            IdpConfig::Jwt($config) => $body,
            IdpConfig::AzureAd($config) => $body,
            IdpConfig::GitHub($config) => $body,
            IdpConfig::GitHubEnterprise($config) => $body,
            IdpConfig::GitLab($config) => $body,
            IdpConfig::GitLabSelfHosted($config) => $body,
            IdpConfig::Google($config) => $body,
            IdpConfig::Ldap($config) => $body,
        }
    };
}

impl IdpConfig {
    pub fn idp_type(&self) -> IdpType {
        match self {
            IdpConfig::OAuth(_) => IdpType::OAuth,
            IdpConfig::Oidc(_) => IdpType::Oidc,
            IdpConfig::Jwt(_) => IdpType::Jwt,
            IdpConfig::AzureAd(_) => IdpType::AzureAd,
            IdpConfig::GitHub(_) => IdpType::GitHub,
            IdpConfig::GitHubEnterprise(_) => IdpType::GitHubEnterprise,
            IdpConfig::GitLab(_) => IdpType::GitLab,
            IdpConfig::GitLabSelfHosted(_) => IdpType::GitLabSelfHosted,
            IdpConfig::Google(_) => IdpType::Google,
            IdpConfig::Ldap(_) => IdpType::Ldap,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        each_config!(self, config => config.validate())
    }

    /// The Added event of this configuration, serialized for `aggregate`.
    pub fn pending_added(
        &self,
        aggregate: &Aggregate,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<PendingEvent, Error> {
        each_config!(self, config => Ok(PendingEvent::new(aggregate, config.added_event(&aggregate.id, alg)?)?))
    }
}

/// One identity provider, modelled by the variant matching its kind.
///
/// The variant is chosen once at construction; events of other kinds are
/// outside its query and never reach it.
#[derive(Clone, Debug)]
pub enum AllIdpWriteModel {
    OAuth(OAuthIdpWriteModel),
    Oidc(OidcIdpWriteModel),
    Jwt(JwtIdpWriteModel),
    AzureAd(AzureAdIdpWriteModel),
    GitHub(GitHubIdpWriteModel),
    GitHubEnterprise(GitHubEnterpriseIdpWriteModel),
    GitLab(GitLabIdpWriteModel),
    GitLabSelfHosted(GitLabSelfHostedIdpWriteModel),
    Google(GoogleIdpWriteModel),
    Ldap(LdapIdpWriteModel),
}

macro_rules! each_model {
    ($value:expr, $model:ident => $body:expr) => {
        match $value {
            AllIdpWriteModel::OAuth($model) => $body,
            AllIdpWriteModel::Oidc($model) => $body,
            AllIdpWriteModel::Jwt($model) => $body,
            AllIdpWriteModel::AzureAd($model) => $body,
            AllIdpWriteModel::GitHub($model) => $body,
            AllIdpWriteModel::GitHubEnterprise($model) => $body,
            AllIdpWriteModel::GitLab($model) => $body,
            AllIdpWriteModel::GitLabSelfHosted($model) => $body,
            AllIdpWriteModel::Google($model) => $body,
            AllIdpWriteModel::Ldap($model) => $body,
        }
    };
}

impl AllIdpWriteModel {
    pub fn new(owner: &Owner, id: &str, idp_type: IdpType) -> Result<Self, Error> {
        Ok(match idp_type {
            IdpType::OAuth => AllIdpWriteModel::OAuth(OAuthIdpWriteModel::new(owner, id)),
            IdpType::Oidc => AllIdpWriteModel::Oidc(OidcIdpWriteModel::new(owner, id)),
            IdpType::Jwt => AllIdpWriteModel::Jwt(JwtIdpWriteModel::new(owner, id)),
            IdpType::AzureAd => AllIdpWriteModel::AzureAd(AzureAdIdpWriteModel::new(owner, id)),
            IdpType::GitHub => AllIdpWriteModel::GitHub(GitHubIdpWriteModel::new(owner, id)),
            IdpType::GitHubEnterprise => {
                AllIdpWriteModel::GitHubEnterprise(GitHubEnterpriseIdpWriteModel::new(owner, id))
            }
            IdpType::GitLab => AllIdpWriteModel::GitLab(GitLabIdpWriteModel::new(owner, id)),
            IdpType::GitLabSelfHosted => {
                AllIdpWriteModel::GitLabSelfHosted(GitLabSelfHostedIdpWriteModel::new(owner, id))
            }
            IdpType::Google => AllIdpWriteModel::Google(GoogleIdpWriteModel::new(owner, id)),
            IdpType::Ldap => AllIdpWriteModel::Ldap(LdapIdpWriteModel::new(owner, id)),
            IdpType::Unspecified => return Err(Error::UnknownKind(idp_type)),
        })
    }

    pub fn idp_type(&self) -> IdpType {
        match self {
            AllIdpWriteModel::OAuth(_) => IdpType::OAuth,
            AllIdpWriteModel::Oidc(_) => IdpType::Oidc,
            AllIdpWriteModel::Jwt(_) => IdpType::Jwt,
            AllIdpWriteModel::AzureAd(_) => IdpType::AzureAd,
            AllIdpWriteModel::GitHub(_) => IdpType::GitHub,
            AllIdpWriteModel::GitHubEnterprise(_) => IdpType::GitHubEnterprise,
            AllIdpWriteModel::GitLab(_) => IdpType::GitLab,
            AllIdpWriteModel::GitLabSelfHosted(_) => IdpType::GitLabSelfHosted,
            AllIdpWriteModel::Google(_) => IdpType::Google,
            AllIdpWriteModel::Ldap(_) => IdpType::Ldap,
        }
    }

    pub fn id(&self) -> &str {
        each_model!(self, model => &model.id)
    }

    pub fn state(&self) -> IdpState {
        each_model!(self, model => model.state)
    }

    pub fn base(&self) -> &WriteModel {
        each_model!(self, model => &model.base)
    }

    /// The event stream this model folds.
    pub fn aggregate(&self) -> Aggregate {
        each_model!(self, model => Aggregate::new(
            &model.id,
            model.scope.aggregate_type(),
            &model.base.resource_owner,
            &model.base.instance_id,
        ))
    }

    /// The Changed event turning this provider into `desired`, if anything differs.
    ///
    /// `desired` must be of the model's own kind.
    pub fn pending_changed(
        &self,
        desired: &IdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<PendingEvent>, Error> {
        let aggregate = self.aggregate();
        macro_rules! changed {
            ($model:expr, $desired:expr) => {
                match $model.changed_event($desired, alg)? {
                    Some(event) => Ok(Some(PendingEvent::new(&aggregate, event)?)),
                    None => Ok(None),
                }
            };
        }

        match (self, desired) {
            (AllIdpWriteModel::OAuth(m), IdpConfig::OAuth(d)) => changed!(m, d),
            (AllIdpWriteModel::Oidc(m), IdpConfig::Oidc(d)) => changed!(m, d),
            (AllIdpWriteModel::Jwt(m), IdpConfig::Jwt(d)) => changed!(m, d),
            (AllIdpWriteModel::AzureAd(m), IdpConfig::AzureAd(d)) => changed!(m, d),
            (AllIdpWriteModel::GitHub(m), IdpConfig::GitHub(d)) => changed!(m, d),
            (AllIdpWriteModel::GitHubEnterprise(m), IdpConfig::GitHubEnterprise(d)) => changed!(m, d),
            (AllIdpWriteModel::GitLab(m), IdpConfig::GitLab(d)) => changed!(m, d),
            (AllIdpWriteModel::GitLabSelfHosted(m), IdpConfig::GitLabSelfHosted(d)) => changed!(m, d),
            (AllIdpWriteModel::Google(m), IdpConfig::Google(d)) => changed!(m, d),
            (AllIdpWriteModel::Ldap(m), IdpConfig::Ldap(d)) => changed!(m, d),
            _ => Err(ValidationError::invalid_argument(format!(
                "identity provider {} is {}, not {}",
                self.id(),
                self.idp_type(),
                desired.idp_type()
            ))
            .into()),
        }
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        each_model!(self, model => model.to_provider(callback_url, alg))
    }
}

impl QueryReducer for AllIdpWriteModel {
    fn search_query(&self) -> SearchQuery {
        each_model!(self, model => model.search_query())
    }

    fn append_events(&mut self, events: Vec<StoredEvent>) {
        each_model!(self, model => QueryReducer::append_events(model, events))
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        each_model!(self, model => QueryReducer::reduce(model))
    }
}
