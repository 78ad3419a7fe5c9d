//! Command orchestration: load, validate, diff, then push under a precondition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use idpstore_crypto::EncryptionAlgorithm;
use idpstore_eventstore::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    all::{AllIdpWriteModel, IdpConfig},
    config::CommandsConfig,
    domain::{INSTANCE_AGGREGATE, IdpState, IdpType, ORG_AGGREGATE, Owner},
    error::{Error, ValidationError},
    events::IdpRemoved,
    provider::Provider,
    remove::IdpRemoveWriteModel,
    type_model::IdpTypeWriteModel,
    variants::{
        azure_ad::{AzureAdIdpConfig, OidcIdpMigratedAzureAd},
        google::{GoogleIdpConfig, OidcIdpMigratedGoogle},
        oidc::OidcIdpWriteModel,
    },
};

/// Who is issuing a command, and how to abort it.
#[derive(Clone, Debug, Default)]
pub struct CommandContext {
    pub editor: String,
    pub cancellation: CancellationToken,
}

impl CommandContext {
    pub fn new(editor: impl Into<String>) -> Self {
        CommandContext {
            editor: editor.into(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Where an aggregate stands after a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectDetails {
    pub sequence: u64,
    pub event_date: DateTime<Utc>,
    pub resource_owner: String,
}

impl ObjectDetails {
    fn from_write_model(base: &WriteModel) -> Self {
        ObjectDetails {
            sequence: base.processed_sequence,
            event_date: base.change_date.unwrap_or_default(),
            resource_owner: base.resource_owner.clone(),
        }
    }

    fn from_pushed(events: &[StoredEvent]) -> Result<Self, Error> {
        let last = events
            .last()
            .ok_or_else(|| EventstoreError::storage("push stored no events"))?;
        Ok(ObjectDetails {
            sequence: last.sequence,
            event_date: last.created_at,
            resource_owner: last.aggregate.resource_owner.clone(),
        })
    }
}

/// The provider kind an OIDC provider is reclassified as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationTarget {
    AzureAd(AzureAdIdpConfig),
    Google(GoogleIdpConfig),
}

impl MigrationTarget {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            MigrationTarget::AzureAd(config) => config.validate(),
            MigrationTarget::Google(config) => config.validate(),
        }
    }

    fn pending(
        &self,
        aggregate: &Aggregate,
        alg: &dyn EncryptionAlgorithm,
    ) -> Result<PendingEvent, Error> {
        Ok(match self {
            MigrationTarget::AzureAd(config) => PendingEvent::new(
                aggregate,
                OidcIdpMigratedAzureAd {
                    added: config.added_event(&aggregate.id, alg)?,
                },
            )?,
            MigrationTarget::Google(config) => PendingEvent::new(
                aggregate,
                OidcIdpMigratedGoogle {
                    added: config.added_event(&aggregate.id, alg)?,
                },
            )?,
        })
    }
}

/// Identity provider commands over one event log.
pub struct Commands<L> {
    log: L,
    idp_alg: Arc<dyn EncryptionAlgorithm>,
    config: CommandsConfig,
}

impl<L: EventLog> Commands<L> {
    pub fn new(log: L, idp_alg: Arc<dyn EncryptionAlgorithm>, config: CommandsConfig) -> Self {
        Commands {
            log,
            idp_alg,
            config,
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Add a provider under a fresh id.
    pub async fn add_idp(
        &self,
        ctx: &CommandContext,
        owner: &Owner,
        config: &IdpConfig,
    ) -> Result<(String, ObjectDetails), Error> {
        let id = Uuid::new_v4().to_string();
        let details = self.add_idp_with_id(ctx, owner, &id, config).await?;
        Ok((id, details))
    }

    /// Add a provider under `id`, failing if the id is taken in either scope.
    #[instrument(skip(self, ctx, owner, config), fields(instance_id = %owner.instance_id, kind = %config.idp_type()))]
    pub async fn add_idp_with_id(
        &self,
        ctx: &CommandContext,
        owner: &Owner,
        id: &str,
        config: &IdpConfig,
    ) -> Result<ObjectDetails, Error> {
        config.validate()?;
        self.retry_on_conflict(move || async move {
            let taken = SearchQuery::with_items([QueryItem::new()
                .instance_id(owner.instance_id.clone())
                .aggregate_types([INSTANCE_AGGREGATE, ORG_AGGREGATE])
                .aggregate_ids([id])]);
            let latest = self.guard(ctx, self.log.latest_sequence(&taken)).await?;
            if latest > 0 {
                return Err(ValidationError::already_exists(format!(
                    "identity provider {id} already exists"
                ))
                .into());
            }

            let aggregate = owner.aggregate(id);
            // Ids are unique across scopes, so the sibling stream must stay empty too.
            let sibling = Aggregate::new(
                id,
                owner.scope.other().aggregate_type(),
                &owner.resource_owner,
                &owner.instance_id,
            );
            let push = Push::new(&ctx.editor)
                .expect(&aggregate, 0)
                .expect(&sibling, 0)
                .pending(config.pending_added(&aggregate, self.idp_alg.as_ref())?);
            self.push(ctx, push).await
        })
        .await
    }

    /// Bring an active provider in line with `config`.
    ///
    /// Nothing is pushed when the provider already matches.
    #[instrument(skip(self, ctx, owner, config), fields(instance_id = %owner.instance_id, kind = %config.idp_type()))]
    pub async fn update_idp(
        &self,
        ctx: &CommandContext,
        owner: &Owner,
        id: &str,
        config: &IdpConfig,
    ) -> Result<ObjectDetails, Error> {
        config.validate()?;
        self.retry_on_conflict(move || async move {
            let mut model = AllIdpWriteModel::new(owner, id, config.idp_type())?;
            self.load(ctx, &mut model).await?;
            match model.state() {
                IdpState::Active => {}
                IdpState::Migrated => {
                    return Err(ValidationError::precondition_failed(format!(
                        "identity provider {id} was migrated"
                    ))
                    .into());
                }
                _ => return Err(not_found(id)),
            }

            let Some(event) = model.pending_changed(config, self.idp_alg.as_ref())? else {
                debug!(id, "identity provider unchanged");
                return Ok(ObjectDetails::from_write_model(model.base()));
            };
            let push = Push::new(&ctx.editor)
                .expect(&model.aggregate(), model.base().processed_sequence)
                .pending(event);
            self.push(ctx, push).await
        })
        .await
    }

    /// Remove an active provider of any kind.
    #[instrument(skip(self, ctx, owner), fields(instance_id = %owner.instance_id))]
    pub async fn remove_idp(
        &self,
        ctx: &CommandContext,
        owner: &Owner,
        id: &str,
    ) -> Result<ObjectDetails, Error> {
        self.retry_on_conflict(move || async move {
            let mut model = IdpRemoveWriteModel::new(owner, id);
            self.load(ctx, &mut model).await?;
            if !model.state.is_active() {
                return Err(not_found(id));
            }

            let aggregate = owner.aggregate(id);
            let push = Push::new(&ctx.editor)
                .expect(&aggregate, model.base.processed_sequence)
                .event(&aggregate, IdpRemoved { id: id.to_string() })?;
            self.push(ctx, push).await
        })
        .await
    }

    /// Reclassify an active OIDC provider as Azure AD or Google.
    #[instrument(skip(self, ctx, owner, target), fields(instance_id = %owner.instance_id))]
    pub async fn migrate_oidc_idp(
        &self,
        ctx: &CommandContext,
        owner: &Owner,
        id: &str,
        target: &MigrationTarget,
    ) -> Result<ObjectDetails, Error> {
        target.validate()?;
        self.retry_on_conflict(move || async move {
            let mut model = OidcIdpWriteModel::new(owner, id);
            self.load(ctx, &mut model).await?;
            match model.state {
                IdpState::Active => {}
                IdpState::Migrated => {
                    return Err(ValidationError::precondition_failed(format!(
                        "identity provider {id} was already migrated"
                    ))
                    .into());
                }
                _ => return Err(not_found(id)),
            }

            let aggregate = owner.aggregate(id);
            let push = Push::new(&ctx.editor)
                .expect(&aggregate, model.base.processed_sequence)
                .pending(target.pending(&aggregate, self.idp_alg.as_ref())?);
            self.push(ctx, push).await
        })
        .await
    }

    /// The kind of an existing provider, looked up by id within an instance.
    #[instrument(skip(self, ctx))]
    pub async fn idp_type(
        &self,
        ctx: &CommandContext,
        instance_id: &str,
        id: &str,
    ) -> Result<IdpType, Error> {
        let (idp_type, _) = self.discover(ctx, instance_id, id).await?;
        Ok(idp_type)
    }

    /// Materialize an existing provider into a runtime client configuration.
    #[instrument(skip(self, ctx, callback_url))]
    pub async fn provider(
        &self,
        ctx: &CommandContext,
        instance_id: &str,
        id: &str,
        callback_url: &str,
    ) -> Result<Provider, Error> {
        let (idp_type, owner) = self.discover(ctx, instance_id, id).await?;
        let mut model = AllIdpWriteModel::new(&owner, id, idp_type)?;
        self.load(ctx, &mut model).await?;
        model.to_provider(callback_url, self.idp_alg.as_ref())
    }

    async fn discover(
        &self,
        ctx: &CommandContext,
        instance_id: &str,
        id: &str,
    ) -> Result<(IdpType, Owner), Error> {
        let mut model = IdpTypeWriteModel::new(instance_id, id);
        self.load(ctx, &mut model).await?;
        match model.owner {
            Some(owner) if model.state.is_active() => Ok((model.idp_type, owner)),
            _ => Err(not_found(id)),
        }
    }

    async fn load<M: QueryReducer>(&self, ctx: &CommandContext, model: &mut M) -> Result<(), Error> {
        self.guard(ctx, load(&self.log, model)).await
    }

    async fn push(&self, ctx: &CommandContext, push: Push) -> Result<ObjectDetails, Error> {
        let count = push.len();
        let stored = self.guard(ctx, self.log.push(push)).await?;
        debug!(count, "pushed events");
        ObjectDetails::from_pushed(&stored)
    }

    async fn guard<T>(
        &self,
        ctx: &CommandContext,
        fut: impl Future<Output = Result<T, EventstoreError>>,
    ) -> Result<T, Error> {
        Ok(cancellable(&ctx.cancellation, self.config.storage_timeout, fut).await?)
    }

    /// Run `attempt` again from scratch while it fails with a concurrency
    /// conflict, at most `max_push_retries` more times.
    async fn retry_on_conflict<T, F, Fut>(&self, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_conflict() && retries < self.config.max_push_retries => {
                    retries += 1;
                    warn!(retries, error = %err, "concurrency conflict, reloading");
                }
                res => return res,
            }
        }
    }
}

fn not_found(id: &str) -> Error {
    ValidationError::not_found(format!("identity provider {id} not found")).into()
}
