use idpstore_crypto::{CryptoValue, EncryptionAlgorithm, encrypt};
use idpstore_eventstore::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    changes::ChangeSet,
    domain::{IdpState, Owner, OwnerScope},
    error::{Error, ValidationError},
    events::IdpRemoved,
    options::{OptionChanges, Options},
    provider::{AZURE_AD_DEFAULT_TENANT, AzureAdProvider, Provider, require_active, reveal},
    variants::{ensure_changes, required, stream_query},
};

#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.azure.added")]
#[serde(rename_all = "camelCase")]
pub struct AzureAdIdpAdded {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: CryptoValue,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(flatten)]
    pub options: Options,
}

/// An OIDC provider reclassified as Azure AD.
///
/// Written to the OIDC provider's stream; the Azure AD model folds it like
/// its own Added event.
#[derive(Clone, Debug, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.oidc.migrated.azure")]
pub struct OidcIdpMigratedAzureAd {
    #[serde(flatten)]
    pub added: AzureAdIdpAdded,
}

#[derive(Clone, Debug, Default, PartialEq, Event, Serialize, Deserialize)]
#[event_type("idp.azure.changed")]
#[serde(rename_all = "camelCase")]
pub struct AzureAdIdpChanged {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<CryptoValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_email_verified: Option<bool>,
    #[serde(flatten)]
    pub option_changes: OptionChanges,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AzureAdIdpChange {
    Name(String),
    ClientId(String),
    ClientSecret(CryptoValue),
    Scopes(Vec<String>),
    Tenant(String),
    IsEmailVerified(bool),
    Options(OptionChanges),
}

impl AzureAdIdpChanged {
    pub fn new(id: impl Into<String>, changes: Vec<AzureAdIdpChange>) -> Result<Self, ValidationError> {
        ensure_changes(&changes)?;
        let mut event = AzureAdIdpChanged {
            id: id.into(),
            ..Default::default()
        };
        for change in changes {
            match change {
                AzureAdIdpChange::Name(v) => event.name = Some(v),
                AzureAdIdpChange::ClientId(v) => event.client_id = Some(v),
                AzureAdIdpChange::ClientSecret(v) => event.client_secret = Some(v),
                AzureAdIdpChange::Scopes(v) => event.scopes = Some(v),
                AzureAdIdpChange::Tenant(v) => event.tenant = Some(v),
                AzureAdIdpChange::IsEmailVerified(v) => event.is_email_verified = Some(v),
                AzureAdIdpChange::Options(v) => event.option_changes = v,
            }
        }
        Ok(event)
    }
}

#[derive(Debug, EventSet)]
pub enum AzureAdIdpEvent {
    Added(AzureAdIdpAdded),
    MigratedFromOidc(OidcIdpMigratedAzureAd),
    Changed(AzureAdIdpChanged),
    Removed(IdpRemoved),
}

/// Desired state of an Azure AD (Entra ID) provider.
///
/// An empty `tenant` means the multi-tenant `common` endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureAdIdpConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub tenant: String,
    pub is_email_verified: bool,
    pub options: Options,
}

impl AzureAdIdpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        required("client id", &self.client_id)
    }

    pub fn added_event(&self, id: &str, alg: &dyn EncryptionAlgorithm) -> Result<AzureAdIdpAdded, Error> {
        required("client secret", &self.client_secret)?;
        Ok(AzureAdIdpAdded {
            id: id.to_string(),
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            client_secret: encrypt(self.client_secret.as_bytes(), alg)?,
            scopes: self.scopes.clone(),
            tenant: self.tenant.clone(),
            is_email_verified: self.is_email_verified,
            options: self.options.clone(),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct AzureAdIdpWriteModel {
    pub base: WriteModel,
    pub scope: OwnerScope,
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: Option<CryptoValue>,
    pub scopes: Vec<String>,
    pub tenant: String,
    pub is_email_verified: bool,
    pub options: Options,
    pub state: IdpState,
}

impl AzureAdIdpWriteModel {
    pub fn new(owner: &Owner, id: impl Into<String>) -> Self {
        let id = id.into();
        AzureAdIdpWriteModel {
            base: WriteModel::new(&id, &owner.resource_owner, &owner.instance_id),
            scope: owner.scope,
            id,
            ..Default::default()
        }
    }

    fn reduce_added(&mut self, e: AzureAdIdpAdded) {
        self.name = e.name;
        self.client_id = e.client_id;
        self.client_secret = Some(e.client_secret);
        self.scopes = e.scopes;
        self.tenant = e.tenant;
        self.is_email_verified = e.is_email_verified;
        self.options = e.options;
        self.state = self.state.transition(IdpState::Active);
    }

    fn reduce_changed(&mut self, e: AzureAdIdpChanged) {
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
        if let Some(v) = e.tenant {
            self.tenant = v;
        }
        if let Some(v) = e.is_email_verified {
            self.is_email_verified = v;
        }
        self.options.reduce_changes(&e.option_changes);
    }

    pub fn new_changes(
        &self,
        desired: &AzureAdIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Vec<AzureAdIdpChange>, Error> {
        Ok(ChangeSet::new()
            .secret(&desired.client_secret, alg, AzureAdIdpChange::ClientSecret)?
            .field(&self.client_id, &desired.client_id, AzureAdIdpChange::ClientId)
            .field(&self.name, &desired.name, AzureAdIdpChange::Name)
            .field(&self.tenant, &desired.tenant, AzureAdIdpChange::Tenant)
            .field(
                &self.is_email_verified,
                &desired.is_email_verified,
                AzureAdIdpChange::IsEmailVerified,
            )
            .field(&self.scopes, &desired.scopes, AzureAdIdpChange::Scopes)
            .nested(self.options.changes(&desired.options), AzureAdIdpChange::Options)
            .into_vec())
    }

    pub fn changed_event(
        &self,
        desired: &AzureAdIdpConfig,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<Option<AzureAdIdpChanged>, Error> {
        let changes = self.new_changes(desired, alg)?;
        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(AzureAdIdpChanged::new(&self.id, changes)?))
    }

    pub fn to_provider(&self, callback_url: &str, alg: &dyn EncryptionAlgorithm) -> Result<Provider, Error> {
        require_active(self.state, &self.id)?;
        let client_secret = reveal(self.client_secret.as_ref(), alg)?;
        let tenant = if self.tenant.is_empty() {
            AZURE_AD_DEFAULT_TENANT.to_string()
        } else {
            self.tenant.clone()
        };
        Ok(Provider::AzureAd(AzureAdProvider {
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            client_secret,
            callback_url: callback_url.to_string(),
            scopes: self.scopes.clone(),
            tenant,
            email_verified: self.is_email_verified,
            options: (&self.options).into(),
        }))
    }
}

impl Reducer for AzureAdIdpWriteModel {
    type Events = AzureAdIdpEvent;
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

    fn apply(&mut self, event: AzureAdIdpEvent) {
        if self.state == IdpState::Removed {
            return;
        }
        match event {
            AzureAdIdpEvent::Added(e) => self.reduce_added(e),
            AzureAdIdpEvent::MigratedFromOidc(e) => self.reduce_added(e.added),
            AzureAdIdpEvent::Changed(e) => self.reduce_changed(e),
            AzureAdIdpEvent::Removed(_) => self.state = self.state.transition(IdpState::Removed),
        }
    }
}
