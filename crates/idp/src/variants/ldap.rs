use std::time::Duration;

use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{LdapAttributeChanges, LdapAttributes, OptionChanges, Options},
    provider::{LdapProvider, Provider, require_active, reveal},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.ldap.v2.added")]
#[serde(rename_all = "camelCase")]
pub struct LdapIdpAdded {
    pub id: String,
    pub name: String,
    pub servers: Vec<String>,
    #[serde(default)]
    pub start_tls: bool,
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_password: CryptoValue,
    pub user_base: String,
    #[serde(default)]
    pub user_object_classes: Vec<String>,
    #[serde(default)]
    pub user_filters: Vec<String>,
    #[serde(default, with = "nanos")]
    pub timeout: Duration,
    #[serde(flatten)]
    pub attributes: LdapAttributes,
    #[serde(flatten)]
    pub options: Options,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.ldap.v2.changed")]
#[serde(rename_all = "camelCase")]
pub struct LdapIdpChanged {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<CryptoValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_object_classes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_filters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nanos::option")]
    pub timeout: Option<Duration>,
    #[serde(flatten)]
    pub attribute_changes: LdapAttributeChanges,
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LdapIdpChange {
    Name(String),
    Servers(Vec<String>),
    StartTls(bool),
    BaseDn(String),
    BindDn(String),
    BindPassword(CryptoValue),
    UserBase(String),
    UserObjectClasses(Vec<String>),
    UserFilters(Vec<String>),
    Timeout(Duration),
    Attributes(LdapAttributeChanges),
    Options(OptionChanges),
}

impl LdapIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<LdapIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = LdapIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                LdapIdpChange::Name(v) => event.name = Some(v),
                LdapIdpChange::Servers(v) => event.servers = Some(v),
                LdapIdpChange::StartTls(v) => event.start_tls = Some(v),
                LdapIdpChange::BaseDn(v) => event.base_dn = Some(v),
                LdapIdpChange::BindDn(v) => event.bind_dn = Some(v),
                LdapIdpChange::BindPassword(v) => event.bind_password = Some(v),
                LdapIdpChange::UserBase(v) => event.user_base = Some(v),
                LdapIdpChange::UserObjectClasses(v) => event.user_object_classes = Some(v),
                LdapIdpChange::UserFilters(v) => event.user_filters = Some(v),
                LdapIdpChange::Timeout(v) => event.timeout = Some(v),
                LdapIdpChange::Attributes(v) => event.attribute_changes = v,
                LdapIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

/// Durations are stored as integer nanoseconds.
mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, ser::Error};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(duration.as_nanos()).map_err(S::Error::custom)?;
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_nanos))
        }
    }
}

#[derive(Debug, EventSet)]
pub enum LdapIdpEvent {
    Added(LdapIdpAdded),
    Changed(LdapIdpChanged),
    Removed(IdpRemoved),
}

/// Desired state of an LDAP directory provider.
///
/// An empty `bind_password` on update keeps the stored password.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LdapIdpConfig {
    pub name: String,
    pub servers: Vec<String>,
    pub start_tls: bool,
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub user_base: String,
    pub user_object_classes: Vec<String>,
    pub user_filters: Vec<String>,
    #[serde(with = "nanos")]
    pub timeout: Duration,
    pub attributes: LdapAttributes,
    pub options: Options,
}

impl LdapIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        if self.servers.is_empty() {
            return Err(ValidationError::invalid_argument("servers must not be empty"));
        }
        required("base dn", &self.base_dn)?;
        required("bind dn", &self.bind_dn)?;
        required("user base", &self.user_base)?;
        if self.user_object_classes.is_empty() || self.user_filters.is_empty() {
            return Err(ValidationError::invalid_argument(
                "user object classes and user filters must not be empty",
            ));
        }
        Ok(())
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<LdapIdpAdded, Error> {
        required("bind password", &self.bind_password)?;
        Ok(LdapIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            servers: self.servers.clone(),
            start_tls: self.start_tls,
            base_dn: self.base_dn.clone(),
            bind_dn: self.bind_dn.clone(),
            bind_password: encrypt(self.bind_password.as_bytes(), alg)?,
            user_base: self.user_base.clone(),
            user_object_classes: self.user_object_classes.clone(),
            user_filters: self.user_filters.clone(),
            timeout: self.timeout,
            attributes: self.attributes.clone(),
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct LdapIdpWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub name: String,
    pub servers: Vec<String>,
    pub start_tls: bool,
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_password: Option<CryptoValue>,
    pub user_base: String,
    pub user_object_classes: Vec<String>,
    pub user_filters: Vec<String>,
    pub timeout: Duration,
    pub attributes: LdapAttributes,
    pub options: Options,
    pub state: IdpState,
}

impl LdapIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        LdapIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: LdapIdpAdded) {
        self.name = e.name;
        self.servers = e.servers;
        self.start_tls = e.start_tls;
        self.base_dn = e.base_dn;
        self.bind_dn = e.bind_dn;
        self.bind_password = Some(e.bind_password);
        self.user_base = e.user_base;
        self.user_object_classes = e.user_object_classes;
        self.user_filters = e.user_filters;
        self.timeout = e.timeout;
        self.attributes = e.attributes;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: LdapIdpChanged) {
        if let Some(v) = e.name {
            self.name = v;
        }
        if let Some(v) = e.servers {
            self.servers = v;
        }
        if let Some(v) = e.start_tls {
            self.start_tls = v;
        }
        if let Some(v) = e.base_dn {
            self.base_dn = v;
        }
        if let Some(v) = e.bind_dn {
            self.bind_dn = v;
        }
        if let Some(v) = e.bind_password {
            self.bind_password = Some(v);
        }
        if let Some(v) = e.user_base {
            self.user_base = v;
        }
        if let Some(v) = e.user_object_classes {
            self.user_object_classes = v;
        }
        if let Some(v) = e.user_filters {
            self.user_filters = v;
        }
        if let Some(v) = e.timeout {
            self.timeout = v;
        }
        self.attributes.reduce_changes(&e.attribute_changes);
        self.options.reduce_changes(&e.option_changes);
    }

    pub fn new_changes(
        &self,
        desired: &LdapIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<LdapIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.bind_password, alg, LdapIdpChange::BindPassword)?
            .field(&self.name, &desired.name, LdapIdpChange::Name)
            .field(&self.servers, &desired.servers, LdapIdpChange::Servers)
            .field(&self.start_tls, &desired.start_tls, LdapIdpChange::StartTls)
            .field(&self.base_dn, &desired.base_dn, LdapIdpChange::BaseDn)
            .field(&self.bind_dn, &desired.bind_dn, LdapIdpChange::BindDn)
            .field(&self.user_base, &desired.user_base, LdapIdpChange::UserBase)
            .field(
                &self.user_object_classes,
                &desired.user_object_classes,
                LdapIdpChange::UserObjectClasses,
            )
            .field(&self.user_filters, &desired.user_filters, LdapIdpChange::UserFilters)
            .field(&self.timeout, &desired.timeout, LdapIdpChange::Timeout)
            .nested(self.attributes.changes(&desired.attributes), LdapIdpChange::Attributes)
            .nested(self.options.changes(&desired.options), LdapIdpChange::Options)
            .into_vec())
    }

    pub fn changed_event(
        &self,
        desired: &LdapIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<LdapIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(LdapIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let bind_password = reveal(self.bind_password.as_ref(), alg)?;
        let attribute_overrides = self
            .attributes
            .overrides()
            .into_iter()
            .map(|(field, attribute)| (field, attribute.to_string()))
            .collect();
        Ok(Provider::Ldap(LdapProvider {
            name: self.name.clone(),
            servers: self.servers.clone(),
            start_tls: self.start_tls,
            base_dn: self.base_dn.clone(),
            bind_dn: self.bind_dn.clone(),
            bind_password,
            user_base: self.user_base.clone(),
            user_object_classes: self.user_object_classes.clone(),
            user_filters: self.user_filters.clone(),
            timeout: self.timeout,
            callback_url: callback_url.to_string(),
            attribute_overrides,
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for LdapIdpWriteModel {
    type Events = LdapIdpEvent;
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

    fn apply(&mut self, event: LdapIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            LdapIdpEvent::Added(e) => self.reduce_added(e),
            LdapIdpEvent::Changed(e) => self.reduce_changed(e),
            LdapIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::variants::testing::{Stream, alg, owner, replay};

    fn config() -> LdapIdpConfig {
        LdapIdpConfig {
            name: "ldap".to_string(),
            servers: vec!["ldaps://ldap.example.com:636".to_string()],
            start_tls: false,
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: "cn=admin,dc=example,dc=com".to_string(),
            bind_password: "password".to_string(),
            user_base: "dn".to_string(),
            user_object_classes: vec!["inetOrgPerson".to_string()],
            user_filters: vec!["uid".to_string()],
            timeout: Duration::from_secs(30),
            attributes: LdapAttributes {
                id_attribute: "uid".to_string(),
                ..Default::default()
            },
            options: Options::default(),
        }
    }

    fn active_model(alg: &dyn EncryptionAlgorithm) -> LdapIdpWriteModel {
        let mut model = LdapIdpWriteModel::new(&owner(), "idp-1");
        replay(
            &mut model,
            Stream::new("idp-1")
                .then(config().added_event("idp-1", alg).unwrap())
                .build(),
        );
        model
    }

    #[test]
    fn timeout_is_stored_as_nanoseconds() {
        let alg = alg();
        let added = config().added_event("idp-1", &alg).unwrap();
        let json = serde_json::to_value(&added).unwrap();
        assert_eq!(json["timeout"], json!(30_000_000_000u64));
        assert_eq!(json["idAttribute"], "uid");

        let back: LdapIdpAdded = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Duration::from_secs(30));
    }

    #[test]
    fn attribute_delta_is_one_entry() {
        let alg = alg();
        let model = active_model(&alg);
        let desired = LdapIdpConfig {
            bind_password: String::new(),
            attributes: LdapAttributes {
                id_attribute: "uid".to_string(),
                email_attribute: "mail".to_string(),
                first_name_attribute: "givenName".to_string(),
                ..Default::default()
            },
            ..config()
        };

        let changes = model.new_changes(&desired, &alg).unwrap();
        assert_eq!(
            changes,
            [LdapIdpChange::Attributes(LdapAttributeChanges {
                first_name_attribute: Some("givenName".to_string()),
                email_attribute: Some("mail".to_string()),
                ..Default::default()
            })]
        );
    }

    #[test]
    fn changed_event_folds_attributes_and_timeout() {
        let alg = alg();
        let mut model = active_model(&alg);
        let changed = LdapIdpChanged::new(
            "idp-1",
            vec![
                LdapIdpChange::Timeout(Duration::from_secs(5)),
                LdapIdpChange::Attributes(LdapAttributeChanges {
                    email_attribute: Some("mail".to_string()),
                    ..Default::default()
                }),
            ],
        )
        .unwrap();
        let events = Stream::new("idp-1")
            .then(config().added_event("idp-1", &alg).unwrap())
            .then(changed)
            .build();
        replay(&mut model, events[1..].to_vec());

        assert_eq!(model.timeout, Duration::from_secs(5));
        assert_eq!(model.attributes.email_attribute, "mail");
        assert_eq!(model.attributes.id_attribute, "uid");
    }

    #[test]
    fn provider_carries_overrides_and_password() {
        let alg = alg();
        let Provider::Ldap(provider) = active_model(&alg).to_provider("https://cb", &alg).unwrap()
        else {
            panic!("expected an ldap provider");
        };
        assert_eq!(provider.bind_password.expose_secret(), "password");
        assert_eq!(provider.attribute_overrides, [("id", "uid".to_string())]);
        assert!(!provider.start_tls);
    }

    #[test]
    fn config_requires_servers() {
        let config = LdapIdpConfig {
            servers: Vec::new(),
            ..config()
        };
        assert!(config.validate().is_err());
    }
}
