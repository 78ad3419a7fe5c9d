use std::fmt;

use idpstore_eventstore::event::{Aggregate, AggregateType};
use serde::{Deserialize, Serialize};

pub const INSTANCE_AGGREGATE: AggregateType = AggregateType::from_static("instance");
pub const ORG_AGGREGATE: AggregateType = AggregateType::from_static("org");

/// The closed set of identity provider kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdpType {
    #[default]
    Unspecified,
    Oidc,
    Jwt,
    OAuth,
    Ldap,
    AzureAd,
    GitHub,
    GitHubEnterprise,
    GitLab,
    GitLabSelfHosted,
    Google,
}

impl fmt::Display for IdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdpType::Unspecified => "unspecified",
            IdpType::Oidc => "oidc",
            IdpType::Jwt => "jwt",
            IdpType::OAuth => "oauth",
            IdpType::Ldap => "ldap",
            IdpType::AzureAd => "azure_ad",
            IdpType::GitHub => "github",
            IdpType::GitHubEnterprise => "github_enterprise",
            IdpType::GitLab => "gitlab",
            IdpType::GitLabSelfHosted => "gitlab_self_hosted",
            IdpType::Google => "google",
        };
        f.write_str(name)
    }
}

/// Lifecycle of an identity provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdpState {
    #[default]
    Unspecified,
    Active,
    Removed,
    Migrated,
}

impl IdpState {
    /// Move to `next` if the lifecycle allows it, otherwise stay.
    ///
    /// Allowed: Unspecified→Active, Active→Active, Active→Migrated,
    /// Active→Removed and Migrated→Removed. Removed is terminal.
    pub fn transition(self, next: IdpState) -> IdpState {
        use IdpState::*;

        match (self, next) {
            (Unspecified | Active, Active)
            | (Active, Migrated)
            | (Active | Migrated, Removed) => next,
            _ => self,
        }
    }

    pub fn is_active(self) -> bool {
        self == IdpState::Active
    }

    /// True once the provider was added and has not been removed.
    pub fn exists(self) -> bool {
        matches!(self, IdpState::Active | IdpState::Migrated)
    }
}

/// Whether an identity provider belongs to the whole instance or to one organization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerScope {
    #[default]
    Instance,
    Org,
}

impl OwnerScope {
    pub fn aggregate_type(self) -> AggregateType {
        match self {
            OwnerScope::Instance => INSTANCE_AGGREGATE,
            OwnerScope::Org => ORG_AGGREGATE,
        }
    }

    pub fn other(self) -> Self {
        match self {
            OwnerScope::Instance => OwnerScope::Org,
            OwnerScope::Org => OwnerScope::Instance,
        }
    }

    pub fn from_aggregate_type(typ: &AggregateType) -> Option<Self> {
        if *typ == INSTANCE_AGGREGATE {
            Some(OwnerScope::Instance)
        } else if *typ == ORG_AGGREGATE {
            Some(OwnerScope::Org)
        } else {
            None
        }
    }
}

/// The tenant an identity provider is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Owner {
    pub scope: OwnerScope,
    pub instance_id: String,
    pub resource_owner: String,
}

impl Owner {
    /// An instance-wide owner; the instance owns itself.
    pub fn instance(instance_id: impl Into<String>) -> Self {
        let instance_id = instance_id.into();
        Owner {
            scope: OwnerScope::Instance,
            resource_owner: instance_id.clone(),
            instance_id,
        }
    }

    pub fn org(instance_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Owner {
            scope: OwnerScope::Org,
            instance_id: instance_id.into(),
            resource_owner: org_id.into(),
        }
    }

    /// The event stream of the identity provider `id`.
    pub fn aggregate(&self, id: &str) -> Aggregate {
        Aggregate::new(
            id,
            self.scope.aggregate_type(),
            self.resource_owner.clone(),
            self.instance_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::IdpState::*;

    const ALL: [IdpState; 4] = [Unspecified, Active, Removed, Migrated];

    #[test]
    fn removed_is_terminal() {
        for next in ALL {
            assert_eq!(Removed.transition(next), Removed);
        }
    }

    #[test]
    fn only_active_can_be_migrated() {
        assert_eq!(Active.transition(Migrated), Migrated);
        assert_eq!(Unspecified.transition(Migrated), Unspecified);
        assert_eq!(Migrated.transition(Active), Migrated);
    }

    #[test]
    fn nothing_returns_to_unspecified() {
        for state in ALL {
            assert_eq!(state.transition(Unspecified), state);
        }
    }

    #[test]
    fn legal_moves() {
        assert_eq!(Unspecified.transition(Active), Active);
        assert_eq!(Active.transition(Active), Active);
        assert_eq!(Active.transition(Removed), Removed);
        assert_eq!(Migrated.transition(Removed), Removed);
        assert_eq!(Unspecified.transition(Removed), Unspecified);
    }

    #[test]
    fn owner_scopes_map_to_aggregate_types() {
        let instance = Owner::instance("i1");
        assert_eq!(instance.resource_owner, "i1");
        assert_eq!(instance.aggregate("idp").typ, INSTANCE_AGGREGATE);

        let org = Owner::org("i1", "o1");
        let aggregate = org.aggregate("idp");
        assert_eq!(aggregate.typ, ORG_AGGREGATE);
        assert_eq!(aggregate.resource_owner, "o1");
        assert_eq!(aggregate.instance_id, "i1");
        assert_eq!(
            OwnerScope::from_aggregate_type(&aggregate.typ),
            Some(OwnerScope::Org)
        );
        assert_eq!(OwnerScope::Org.other(), OwnerScope::Instance);
        assert_eq!(OwnerScope::Instance.other(), OwnerScope::Org);
    }
}
