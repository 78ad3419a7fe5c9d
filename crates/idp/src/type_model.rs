use idpstore_eventstore::prelude::*;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    domain::{INSTANCE_AGGREGATE, IdpState, IdpType, ORG_AGGREGATE, Owner, OwnerScope},
    events::{IdpRemoved, LegacyConfigAdded, LegacyConfigRemoved, LegacyConfigType},
    variants::{
        azure_ad::{AzureAdIdpAdded, OidcIdpMigratedAzureAd},
        github::GitHubIdpAdded,
        github_enterprise::GitHubEnterpriseIdpAdded,
        gitlab::GitLabIdpAdded,
        gitlab_self_hosted::GitLabSelfHostedIdpAdded,
        google::{GoogleIdpAdded, OidcIdpMigratedGoogle},
        jwt::JwtIdpAdded,
        ldap::LdapIdpAdded,
        oauth::OAuthIdpAdded,
        oidc::OidcIdpAdded,
    },
};

#[derive(Debug, EventSet)]
enum IdpKindEvent {
    OAuthAdded(OAuthIdpAdded),
    OidcAdded(OidcIdpAdded),
    JwtAdded(JwtIdpAdded),
    AzureAdAdded(AzureAdIdpAdded),
    GitHubAdded(GitHubIdpAdded),
    GitHubEnterpriseAdded(GitHubEnterpriseIdpAdded),
    GitLabAdded(GitLabIdpAdded),
    GitLabSelfHostedAdded(GitLabSelfHostedIdpAdded),
    GoogleAdded(GoogleIdpAdded),
    LdapAdded(LdapIdpAdded),
    MigratedAzureAd(OidcIdpMigratedAzureAd),
    MigratedGoogle(OidcIdpMigratedGoogle),
    Removed(IdpRemoved),
}

#[derive(Debug, EventSet)]
enum LegacyKindEvent {
    ConfigAdded(LegacyConfigAdded),
    ConfigRemoved(LegacyConfigRemoved),
}

/// Discovers the kind and owner of an identity provider from its id alone.
///
/// Searches both instance and org streams of one instance. A migrated
/// OIDC provider reports its migration target.
#[derive(Clone, Debug, Default)]
pub struct IdpTypeWriteModel {
    pub base: WriteModel,
    pub id: String,
    pub idp_type: IdpType,
    pub state: IdpState,
    pub owner: Option<Owner>,
}

impl IdpTypeWriteModel {
    pub fn new(instance_id: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        IdpTypeWriteModel {
            base: WriteModel::new(&id, "", instance_id),
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, id: &str, idp_type: IdpType, aggregate: &Aggregate) {
        if id != self.id {
            return;
        }
        let Some(scope) = OwnerScope::from_aggregate_type(&aggregate.typ) else {
            return;
        };
        self.idp_type = idp_type;
        self.state = self.state.transition(IdpState::Active);
        self.owner = Some(Owner {
            scope,
            instance_id: aggregate.instance_id.clone(),
            resource_owner: aggregate.resource_owner.clone(),
        });
    }

    fn reduce_removed(&mut self, id: &str) {
        if id != self.id {
            return;
        }
        self.idp_type = IdpType::Unspecified;
        self.state = self.state.transition(IdpState::Removed);
        self.owner = None;
    }

    fn apply(&mut self, event: IdpKindEvent, aggregate: &Aggregate) {
        use IdpKindEvent::*;

        let (id, idp_type) = match event {
            OAuthAdded(e) => (e.id, IdpType::OAuth),
            OidcAdded(e) => (e.id, IdpType::Oidc),
            JwtAdded(e) => (e.id, IdpType::Jwt),
            AzureAdAdded(e) => (e.id, IdpType::AzureAd),
            MigratedAzureAd(e) => (e.added.id, IdpType::AzureAd),
            GitHubAdded(e) => (e.id, IdpType::GitHub),
            GitHubEnterpriseAdded(e) => (e.id, IdpType::GitHubEnterprise),
            GitLabAdded(e) => (e.id, IdpType::GitLab),
            GitLabSelfHostedAdded(e) => (e.id, IdpType::GitLabSelfHosted),
            GoogleAdded(e) => (e.id, IdpType::Google),
            MigratedGoogle(e) => (e.added.id, IdpType::Google),
            LdapAdded(e) => (e.id, IdpType::Ldap),
            Removed(e) => return self.reduce_removed(&e.id),
        };
        self.reduce_added(&id, idp_type, aggregate);
    }

    fn apply_legacy(&mut self, event: LegacyKindEvent, aggregate: &Aggregate) {
        match event {
            LegacyKindEvent::ConfigAdded(e) => match e.typ {
                LegacyConfigType::Oidc => self.reduce_added(&e.idp_config_id, IdpType::Oidc, aggregate),
                LegacyConfigType::Jwt => self.reduce_added(&e.idp_config_id, IdpType::Jwt, aggregate),
                LegacyConfigType::Saml => {}
            },
            LegacyKindEvent::ConfigRemoved(e) => self.reduce_removed(&e.idp_config_id),
        }
    }
}

fn payload_field(key: &str, value: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(key.to_string(), Value::String(value.to_string()));
    data
}

impl QueryReducer for IdpTypeWriteModel {
    fn search_query(&self) -> SearchQuery {
        let mut query = SearchQuery::new();
        for typ in [INSTANCE_AGGREGATE, ORG_AGGREGATE] {
            query = query
                .or(QueryItem::new()
                    .instance_id(self.base.instance_id.clone())
                    .aggregate_types([typ.clone()])
                    .event_types(IdpKindEvent::EVENT_TYPES.iter().copied())
                    .event_data(payload_field("id", &self.id)))
                .or(QueryItem::new()
                    .instance_id(self.base.instance_id.clone())
                    .aggregate_types([typ])
                    .event_types(LegacyKindEvent::EVENT_TYPES.iter().copied())
                    .event_data(payload_field("idpConfigId", &self.id)));
        }
        query
    }

    fn append_events(&mut self, events: Vec<StoredEvent>) {
        self.base.append_events(events);
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        let events = self.base.take_events();
        for event in &events {
            if let Some(ev) =
                IdpKindEvent::from_event(&event.event_type, event.payload.clone()).transpose()?
            {
                self.apply(ev, &event.aggregate);
                continue;
            }
            match LegacyKindEvent::from_event(&event.event_type, event.payload.clone()).transpose()? {
                Some(ev) => self.apply_legacy(ev, &event.aggregate),
                None => warn!(event_type = %event.event_type, "received event unused by write model"),
            }
        }
        self.base.reduce(&events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::{
        azure_ad::AzureAdIdpConfig,
        oidc::OidcIdpConfig,
        testing::{alg, stored},
    };

    fn oidc_added(alg: &dyn idpstore_crypto::EncryptionAlgorithm) -> OidcIdpAdded {
        OidcIdpConfig {
            name: "oidc".to_string(),
            issuer: "https://issuer".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        }
        .added_event("idp-1", alg)
        .unwrap()
    }

    #[test]
    fn discovers_kind_and_owner() {
        let alg = alg();
        let owner = Owner::instance("instance-1");
        let aggregate = owner.aggregate("idp-1");

        let mut model = IdpTypeWriteModel::new("instance-1", "idp-1");
        model.append_events(vec![stored(&aggregate, 1, oidc_added(&alg))]);
        model.reduce().unwrap();

        assert_eq!(model.idp_type, IdpType::Oidc);
        assert_eq!(model.state, IdpState::Active);
        assert_eq!(model.owner, Some(owner));
    }

    #[test]
    fn migration_switches_kind() {
        let alg = alg();
        let aggregate = Owner::org("instance-1", "org-1").aggregate("idp-1");
        let azure = AzureAdIdpConfig {
            name: "azure".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        };

        let mut model = IdpTypeWriteModel::new("instance-1", "idp-1");
        model.append_events(vec![
            stored(&aggregate, 1, oidc_added(&alg)),
            stored(
                &aggregate,
                2,
                OidcIdpMigratedAzureAd {
                    added: azure.added_event("idp-1", &alg).unwrap(),
                },
            ),
        ]);
        model.reduce().unwrap();

        assert_eq!(model.idp_type, IdpType::AzureAd);
        assert_eq!(model.owner.map(|o| o.scope), Some(OwnerScope::Org));
    }

    #[test]
    fn legacy_saml_config_is_not_a_known_kind() {
        let aggregate = Owner::instance("instance-1").aggregate("idp-1");
        let mut model = IdpTypeWriteModel::new("instance-1", "idp-1");
        model.append_events(vec![stored(
            &aggregate,
            1,
            LegacyConfigAdded {
                idp_config_id: "idp-1".to_string(),
                name: "saml".to_string(),
                typ: LegacyConfigType::Saml,
                auto_register: false,
            },
        )]);
        model.reduce().unwrap();

        assert_eq!(model.idp_type, IdpType::Unspecified);
        assert!(model.owner.is_none());
    }

    #[test]
    fn removal_forgets_kind() {
        let alg = alg();
        let aggregate = Owner::instance("instance-1").aggregate("idp-1");
        let mut model = IdpTypeWriteModel::new("instance-1", "idp-1");
        model.append_events(vec![
            stored(&aggregate, 1, oidc_added(&alg)),
            stored(&aggregate, 2, IdpRemoved { id: "idp-1".to_string() }),
        ]);
        model.reduce().unwrap();

        assert_eq!(model.idp_type, IdpType::Unspecified);
        assert_eq!(model.state, IdpState::Removed);
        assert!(model.owner.is_none());
    }

    #[test]
    fn query_covers_both_scopes_and_legacy_ids() {
        let model = IdpTypeWriteModel::new("instance-1", "idp-1");
        let query = model.search_query();

        assert_eq!(query.items.len(), 4);
        assert!(query.items.iter().all(|item| item.instance_id.as_deref() == Some("instance-1")));
        assert_eq!(query.items[0].event_data["id"], "idp-1");
        assert_eq!(query.items[1].event_data["idpConfigId"], "idp-1");
        assert_eq!(query.items[3].aggregate_types, [ORG_AGGREGATE]);
    }

    #[test]
    fn events_of_other_ids_are_ignored() {
        let alg = alg();
        let aggregate = Owner::instance("instance-1").aggregate("idp-1");
        let other = OidcIdpConfig {
            name: "other".to_string(),
            issuer: "https://issuer".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        }
        .added_event("idp-2", &alg)
        .unwrap();

        let mut model = IdpTypeWriteModel::new("instance-1", "idp-1");
        model.append_events(vec![
            stored(&aggregate, 1, oidc_added(&alg)),
            stored(&aggregate, 2, other),
            stored(&aggregate, 3, IdpRemoved { id: "idp-2".to_string() }),
            stored(
                &aggregate,
                4,
                LegacyConfigRemoved {
                    idp_config_id: "idp-2".to_string(),
                },
            ),
        ]);
        model.reduce().unwrap();

        assert_eq!(model.idp_type, IdpType::Oidc);
        assert_eq!(model.state, IdpState::Active);
        assert_eq!(model.base.processed_sequence, 4);
    }
}
