use idpstore_eventstore::prelude::*;

use crate::{
    domain::{IdpState, Owner, OwnerScope},
    events::{
        IdpRemoved, LegacyConfigAdded, LegacyConfigChanged, LegacyConfigRemoved,
        LegacyJwtConfigAdded, LegacyJwtConfigChanged, LegacyOidcConfigAdded,
        LegacyOidcConfigChanged,
    },
    variants::{
        azure_ad::{AzureAdIdpAdded, AzureAdIdpChanged, OidcIdpMigratedAzureAd},
        github::{GitHubIdpAdded, GitHubIdpChanged},
        github_enterprise::{GitHubEnterpriseIdpAdded, GitHubEnterpriseIdpChanged},
        gitlab::{GitLabIdpAdded, GitLabIdpChanged},
        gitlab_self_hosted::{GitLabSelfHostedIdpAdded, GitLabSelfHostedIdpChanged},
        google::{GoogleIdpAdded, GoogleIdpChanged, OidcIdpMigratedGoogle},
        jwt::{JwtIdpAdded, JwtIdpChanged},
        ldap::{LdapIdpAdded, LdapIdpChanged},
        oauth::{OAuthIdpAdded, OAuthIdpChanged},
        oidc::{OidcIdpAdded, OidcIdpChanged},
        stream_query,
    },
};

/// Every event a provider stream can hold.
///
/// Only Added and Removed decide existence. The rest are listed so that
/// the processed sequence tracks the stream tail.
#[derive(Debug, EventSet)]
pub enum IdpLifecycleEvent {
    OAuthAdded(OAuthIdpAdded),
    OAuthChanged(OAuthIdpChanged),
    OidcAdded(OidcIdpAdded),
    OidcChanged(OidcIdpChanged),
    JwtAdded(JwtIdpAdded),
    JwtChanged(JwtIdpChanged),
    AzureAdAdded(AzureAdIdpAdded),
    AzureAdChanged(AzureAdIdpChanged),
    GitHubAdded(GitHubIdpAdded),
    GitHubChanged(GitHubIdpChanged),
    GitHubEnterpriseAdded(GitHubEnterpriseIdpAdded),
    GitHubEnterpriseChanged(GitHubEnterpriseIdpChanged),
    GitLabAdded(GitLabIdpAdded),
    GitLabChanged(GitLabIdpChanged),
    GitLabSelfHostedAdded(GitLabSelfHostedIdpAdded),
    GitLabSelfHostedChanged(GitLabSelfHostedIdpChanged),
    GoogleAdded(GoogleIdpAdded),
    GoogleChanged(GoogleIdpChanged),
    LdapAdded(LdapIdpAdded),
    LdapChanged(LdapIdpChanged),
    MigratedAzureAd(OidcIdpMigratedAzureAd),
    MigratedGoogle(OidcIdpMigratedGoogle),
    Removed(IdpRemoved),
}

#[derive(Debug, EventSet)]
pub enum LegacyLifecycleEvent {
    ConfigAdded(LegacyConfigAdded),
    ConfigChanged(LegacyConfigChanged),
    ConfigRemoved(LegacyConfigRemoved),
    OidcConfigAdded(LegacyOidcConfigAdded),
    OidcConfigChanged(LegacyOidcConfigChanged),
    JwtConfigAdded(LegacyJwtConfigAdded),
    JwtConfigChanged(LegacyJwtConfigChanged),
}

/// Whether an identity provider of any kind exists, for removal.
#[derive(Clone, Debug, Default)]
pub struct IdpRemoveWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub state: IdpState,
}

impl IdpRemoveWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        IdpRemoveWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            state: IdpState::Unspecified,
        }
    }

    fn reduce_added(&mut self, id: &str) {
        if id == self.id {
            self.state = self.state.transition(IdpState::Active);
        }
    }

    fn reduce_removed(&mut self, id: &str) {
        if id == self.id {
            self.state = self.state.transition(IdpState::Removed);
        }
    }
}

impl Reducer for IdpRemoveWriteModel {
    type Events = IdpLifecycleEvent;
    type LegacyEvents = LegacyLifecycleEvent;

    fn write_model(&self) -> &WriteModel {
        &self.base
    }

    fn write_model_mut(&mut self) -> &mut WriteModel {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        stream_query(self, self.scope)
    }

    fn apply(&mut self, event: IdpLifecycleEvent) {
        use IdpLifecycleEvent::*;

        match event {
            OAuthAdded(e) => self.reduce_added(&e.id),
            OidcAdded(e) => self.reduce_added(&e.id),
            JwtAdded(e) => self.reduce_added(&e.id),
            AzureAdAdded(e) => self.reduce_added(&e.id),
            GitHubAdded(e) => self.reduce_added(&e.id),
            GitHubEnterpriseAdded(e) => self.reduce_added(&e.id),
            GitLabAdded(e) => self.reduce_added(&e.id),
            GitLabSelfHostedAdded(e) => self.reduce_added(&e.id),
            GoogleAdded(e) => self.reduce_added(&e.id),
            LdapAdded(e) => self.reduce_added(&e.id),
            Removed(e) => self.reduce_removed(&e.id),
            OAuthChanged(_) | OidcChanged(_) | JwtChanged(_) | AzureAdChanged(_)
            | GitHubChanged(_) | GitHubEnterpriseChanged(_) | GitLabChanged(_)
            | GitLabSelfHostedChanged(_) | GoogleChanged(_) | LdapChanged(_)
            | MigratedAzureAd(_) | MigratedGoogle(_) => {}
        }
    }

    fn apply_legacy(&mut self, event: LegacyLifecycleEvent) {
        match event {
            LegacyLifecycleEvent::ConfigAdded(e) => self.reduce_added(&e.idp_config_id),
            LegacyLifecycleEvent::ConfigRemoved(e) => self.reduce_removed(&e.idp_config_id),
            _ => {}
        }
    }
}
