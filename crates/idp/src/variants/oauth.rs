use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{OptionChanges, Options},
    provider::{OAuthProvider, Provider, require_active, reveal},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oauth.added")]
#[serde(rename_all = "camelCase")]
pub struct OAuthIdpAdded {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: CryptoValue,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub id_attribute: String,
    #[serde(flatten)]
    pub options: Options,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oauth.changed")]
#[serde(rename_all = "camelCase")]
pub struct OAuthIdpChanged {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_attribute: Option<String>,
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OAuthIdpChange {
    Name(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    AuthorizationEndpoint(String),
    TokenEndpoint(String),
    UserEndpoint(String),
    Scopes(Vec<String>),
    IdAttribute(String),
    Options(OptionChanges),
}

impl OAuthIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<OAuthIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = OAuthIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                OAuthIdpChange::Name(v) => event.name = Some(v),
                OAuthIdpChange::ClientId(v) => event.client_id = Some(v),
                OAuthIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                OAuthIdpChange::AuthorizationEndpoint(v) => event.authorization_endpoint = Some(v),
                OAuthIdpChange::TokenEndpoint(v) => event.token_endpoint = Some(v),
                OAuthIdpChange::UserEndpoint(v) => event.user_endpoint = Some(v),
                OAuthIdpChange::Scopes(v) => event.scopes = Some(v),
                OAuthIdpChange::IdAttribute(v) => event.id_attribute = Some(v),
                OAuthIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum OAuthIdpEvent {
    Added(OAuthIdpAdded),
    Changed(OAuthIdpChanged),
    Removed(IdpRemoved),
}

/// Desired state of a generic OAuth 2.0 provider.
///
/// An empty `client_secret` on update keeps the stored secret.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthIdpConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_endpoint: String,
    pub scopes: Vec<String>,
    pub id_attribute: String,
    pub options: Options,
}

impl OAuthIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        required("client id", &self.client_id)?;
        required("authorization endpoint", &self.authorization_endpoint)?;
        required("token endpoint", &self.token_endpoint)?;
        required("user endpoint", &self.user_endpoint)?;
        required("id attribute", &self.id_attribute)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<OAuthIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(OAuthIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            client_secret: encrypt(self.client_secret.as_bytes(), alg)?,
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            user_endpoint: self.user_endpoint.clone(),
            scopes: self.scopes.clone(),
            id_attribute: self.id_attribute.clone(),
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct OAuthIdpWriteModel {
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
    pub id_attribute: String,
    pub options: Options,
    pub state: IdpState,
}

impl OAuthIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        OAuthIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: OAuthIdpAdded) {
        self.name = e.name;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.authorization_endpoint = e.authorization_endpoint;
        self.token_endpoint = e.token_endpoint;
        self.user_endpoint = e.user_endpoint;
        self.scopes = e.scopes;
        self.id_attribute = e.id_attribute;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: OAuthIdpChanged) {
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
        if let Some(v) = e.id_attribute {
            self.id_attribute = v;
        }
        self.options.reduce_changes(&e.option_changes);
    }

    /// The field changes needed to reach `desired`.
    pub fn new_changes(
        &self,
        desired: &OAuthIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<OAuthIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, OAuthIdpChange::ClientSecret)?
            .field(&self.client_id, &desired.client_id, OAuthIdpChange::ClientId)
            .field(&self.name, &desired.name, OAuthIdpChange::Name)
            .field(
                &self.authorization_endpoint,
                &desired.authorization_endpoint,
                OAuthIdpChange::AuthorizationEndpoint,
            )
            .field(&self.token_endpoint, &desired.token_endpoint, OAuthIdpChange::TokenEndpoint)
            .field(&self.user_endpoint, &desired.user_endpoint, OAuthIdpChange::UserEndpoint)
            .field(&self.scopes, &desired.scopes, OAuthIdpChange::Scopes)
            .field(&self.id_attribute, &desired.id_attribute, OAuthIdpChange::IdAttribute)
            .nested(self.options.changes(&desired.options), OAuthIdpChange::Options)
            .into_vec())
    }

    /// The changed event reaching `desired`, or `None` if nothing differs.
    pub fn changed_event(
        &self,
        desired: &OAuthIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<OAuthIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(OAuthIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        Ok(Provider::OAuth(OAuthProvider {
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            user_endpoint: self.user_endpoint.clone(),
            scopes: self.scopes.clone(),
            id_attribute: self.id_attribute.clone(),
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for OAuthIdpWriteModel {
    type Events = OAuthIdpEvent;
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

    fn apply(&mut self, event: OAuthIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            OAuthIdpEvent::Added(e) => self.reduce_added(e),
            OAuthIdpEvent::Changed(e) => self.reduce_changed(e),
            OAuthIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use idpstore_crypto::decrypt_string;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        error::ErrorCode,
        variants::testing::{Stream, alg, owner, replay},
    };

    fn config() -> OAuthIdpConfig {
        OAuthIdpConfig {
            name: "A".to_string(),
            client_id: "1".to_string(),
            client_secret: "secret".to_string(),
            authorization_endpoint: "https://idp/authorize".to_string(),
            token_endpoint: "https://idp/token".to_string(),
            user_endpoint: "https://idp/user".to_string(),
            scopes: vec!["openid".to_string()],
            id_attribute: "sub".to_string(),
            options: Options::default(),
        }
    }

    fn added(alg: &dyn EncryptionAlgorithm) -> OAuthIdpAdded {
        config().added_event("idp-1", alg).unwrap()
    }

    fn active_model(alg: &dyn EncryptionAlgorithm) -> OAuthIdpWriteModel {
        let mut model = OAuthIdpWriteModel::new(&owner(), "idp-1");
        replay(&mut model, Stream::new("idp-1").then(added(alg)).build());
        model
    }

    // ============================================================================
    // Reduce
    // ============================================================================

    #[test]
    fn added_event_activates() {
        let alg = alg();
        let model = active_model(&alg);

        assert_eq!(model.state, IdpState::Active);
        assert_eq!(model.name, "A");
        assert_eq!(model.base.processed_sequence, 1);
        let secret = model.client_secret.as_ref().unwrap();
        assert_eq!(decrypt_string(secret, &alg).unwrap(), "secret");
    }

    #[test]
    fn changed_event_merges_fields() {
        let alg = alg();
        let mut model = active_model(&alg);
        let changed = OAuthIdpChanged::new(
            "idp-1",
            vec![
                OAuthIdpChange::Name("B".to_string()),
                OAuthIdpChange::Options(OptionChanges {
                    is_auto_update: Some(true),
                    ..Default::default()
                }),
            ],
        )
        .unwrap();

        let events = Stream::new("idp-1").then(added(&alg)).then(changed).build();
        replay(&mut model, events[1..].to_vec());

        assert_eq!(model.name, "B");
        assert_eq!(model.client_id, "1");
        assert!(model.options.is_auto_update);
        assert_eq!(model.base.processed_sequence, 2);
    }

    #[test]
    fn removed_is_terminal() {
        let alg = alg();
        let mut model = OAuthIdpWriteModel::new(&owner(), "idp-1");
        let events = Stream::new("idp-1")
            .then(added(&alg))
            .then(IdpRemoved { id: "idp-1".to_string() })
            .then(added(&alg))
            .build();
        replay(&mut model, events);

        assert_eq!(model.state, IdpState::Removed);
        assert_eq!(model.base.processed_sequence, 3);
    }

    #[test]
    fn query_is_scoped_to_stream() {
        let model = OAuthIdpWriteModel::new(&owner(), "idp-1");
        let query = model.query();
        let item = &query.items[0];
        assert_eq!(item.aggregate_ids, ["idp-1"]);
        assert_eq!(item.instance_id.as_deref(), Some("instance-1"));
        assert_eq!(item.resource_owner.as_deref(), Some("org-1"));
        assert_eq!(
            item.event_types,
            ["idp.oauth.added", "idp.oauth.changed", "idp.removed"]
        );
    }

    // ============================================================================
    // Changes
    // ============================================================================

    #[test]
    fn unchanged_config_has_no_changes() {
        let alg = alg();
        let model = active_model(&alg);
        let desired = OAuthIdpConfig {
            client_secret: String::new(),
            ..config()
        };
        assert!(model.new_changes(&desired, &alg).unwrap().is_empty());
        assert!(model.changed_event(&desired, &alg).unwrap().is_none());
    }

    #[test]
    fn rename_yields_single_change() {
        let alg = alg();
        let model = active_model(&alg);
        let desired = OAuthIdpConfig {
            name: "B".to_string(),
            client_secret: String::new(),
            ..config()
        };

        let changes = model.new_changes(&desired, &alg).unwrap();
        assert_eq!(changes, [OAuthIdpChange::Name("B".to_string())]);
    }

    #[test]
    fn new_secret_is_always_included() {
        let alg = alg();
        let model = active_model(&alg);
        let changes = model.new_changes(&config(), &alg).unwrap();
        assert!(matches!(changes.as_slice(), [OAuthIdpChange::ClientSecret(_)]));
    }

    #[test]
    fn changed_without_changes_is_rejected() {
        let err = OAuthIdpChanged::new("idp-1", Vec::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoChanges);
    }

    #[test]
    fn changed_payload_is_minimal() {
        let changed =
            OAuthIdpChanged::new("idp-1", vec![OAuthIdpChange::Name("B".to_string())]).unwrap();
        assert_eq!(
            serde_json::to_value(&changed).unwrap(),
            serde_json::json!({ "id": "idp-1", "name": "B" })
        );
    }

    // ============================================================================
    // Provider
    // ============================================================================

    #[test]
    fn active_model_materializes() {
        let alg = alg();
        let Provider::OAuth(provider) = active_model(&alg).to_provider("https://cb", &alg).unwrap()
        else {
            panic!("expected an oauth provider");
        };
        assert_eq!(provider.client_secret.expose_secret(), "secret");
        assert_eq!(provider.callback_url, "https://cb");
        assert_eq!(provider.id_attribute, "sub");
    }

    #[test]
    fn removed_model_does_not_materialize() {
        let alg = alg();
        let mut model = active_model(&alg);
        model.state = model.state.transition(IdpState::Removed);
        let err = model.to_provider("https://cb", &alg).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::PreconditionFailed));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn replay_matches_direct_updates(names in prop::collection::vec("[a-z]{1,8}", 1..10)) {
            let alg = alg();
            let mut stream = Stream::new("idp-1").then(added(&alg));
            let mut expected = String::from("A");
            for name in &names {
                if *name != expected {
                    stream = stream.then(
                        OAuthIdpChanged::new("idp-1", vec![OAuthIdpChange::Name(name.clone())]).unwrap(),
                    );
                    expected = name.clone();
                }
            }
            let events = stream.build();

            let mut once = OAuthIdpWriteModel::new(&owner(), "idp-1");
            replay(&mut once, events.clone());

            let mut chunked = OAuthIdpWriteModel::new(&owner(), "idp-1");
            for chunk in events.chunks(2) {
                replay(&mut chunked, chunk.to_vec());
            }

            prop_assert_eq!(&once.name, &expected);
            prop_assert_eq!(&chunked.name, &expected);
            prop_assert_eq!(once.base.processed_sequence, chunked.base.processed_sequence);
        }
    }
}
