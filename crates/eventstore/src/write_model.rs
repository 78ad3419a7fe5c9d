use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    error::EventstoreError,
    event::{EventSet, StoredEvent},
    log::EventLog,
    query::SearchQuery,
};

/// Bookkeeping shared by every write model.
///
/// Events are buffered with [`append_events`](Self::append_events) and
/// folded by the owning model; [`reduce`](Self::reduce) then records how
/// far the model has read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteModel {
    pub aggregate_id: String,
    pub resource_owner: String,
    pub instance_id: String,
    /// Sequence of the last folded event, 0 if none.
    pub processed_sequence: u64,
    pub change_date: Option<DateTime<Utc>>,
    events: Vec<StoredEvent>,
}

impl WriteModel {
    pub fn new(
        aggregate_id: impl Into<String>,
        resource_owner: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        WriteModel {
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            instance_id: instance_id.into(),
            ..Default::default()
        }
    }

    /// Buffer events for the next reduce. Must be in ascending order.
    pub fn append_events(&mut self, events: impl IntoIterator<Item = StoredEvent>) {
        self.events.extend(events);
    }

    /// Take the buffered events, leaving the buffer empty.
    pub fn take_events(&mut self) -> Vec<StoredEvent> {
        std::mem::take(&mut self.events)
    }

    /// Record the position reached after folding `events`.
    ///
    /// Identity fields left empty at construction are filled from the
    /// first event.
    pub fn reduce(&mut self, events: &[StoredEvent]) {
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return;
        };
        if self.aggregate_id.is_empty() {
            self.aggregate_id = first.aggregate.id.clone();
        }
        if self.resource_owner.is_empty() {
            self.resource_owner = first.aggregate.resource_owner.clone();
        }
        if self.instance_id.is_empty() {
            self.instance_id = first.aggregate.instance_id.clone();
        }
        self.processed_sequence = last.sequence;
        self.change_date = Some(last.created_at);
    }
}

/// The main trait for implementing write models.
///
/// A write model:
/// 1. Declares its query (which streams and which event types)
/// 2. Rebuilds state by folding historical events via `apply`
/// 3. Is consulted by a command to validate and diff before pushing
///
/// Legacy event shapes are folded by a separate `apply_legacy`, so the
/// modern reducer never sees them.
///
/// # Example
///
/// ```rust,ignore
/// impl Reducer for JwtIdpWriteModel {
///     type Events = JwtIdpEvent;
///     type LegacyEvents = LegacyJwtEvent;
///
///     fn write_model(&self) -> &WriteModel { &self.base }
///     fn write_model_mut(&mut self) -> &mut WriteModel { &mut self.base }
///
///     fn query(&self) -> SearchQuery { ... }
///
///     fn apply(&mut self, event: JwtIdpEvent) {
///         match event {
///             JwtIdpEvent::Added(ev) => self.reduce_added(ev),
///             JwtIdpEvent::Changed(ev) => self.reduce_changed(ev),
///             JwtIdpEvent::Removed(_) => self.state = IdpState::Removed,
///         }
///     }
/// }
/// ```
pub trait Reducer: Send {
    /// The set of event types this model folds.
    type Events: EventSet;

    /// Older event shapes still present in historical streams.
    type LegacyEvents: EventSet;

    fn write_model(&self) -> &WriteModel;

    fn write_model_mut(&mut self) -> &mut WriteModel;

    /// The events relevant to this model.
    fn query(&self) -> SearchQuery;

    /// Fold one event into state.
    ///
    /// Called once for each event matching the query, in order.
    fn apply(&mut self, event: Self::Events);

    /// Fold one legacy event into state.
    fn apply_legacy(&mut self, event: Self::LegacyEvents) {
        let _ = event;
    }
}

/// Object-safe view of a write model, for loading several at once.
pub trait QueryReducer: Send {
    fn search_query(&self) -> SearchQuery;

    fn append_events(&mut self, events: Vec<StoredEvent>);

    /// Fold all buffered events.
    ///
    /// Unknown event types are skipped; payloads that fail to decode
    /// are errors.
    fn reduce(&mut self) -> Result<(), EventstoreError>;
}

impl<T: Reducer> QueryReducer for T {
    fn search_query(&self) -> SearchQuery {
        self.query()
    }

    fn append_events(&mut self, events: Vec<StoredEvent>) {
        self.write_model_mut().append_events(events);
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        let events = self.write_model_mut().take_events();
        for event in &events {
            if let Some(ev) =
                T::Events::from_event(&event.event_type, event.payload.clone()).transpose()?
            {
                self.apply(ev);
                continue;
            }
            let Some(ev) =
                T::LegacyEvents::from_event(&event.event_type, event.payload.clone()).transpose()?
            else {
                warn!(event_type = %event.event_type, "received event unused by write model");
                continue;
            };
            self.apply_legacy(ev);
        }
        self.write_model_mut().reduce(&events);
        Ok(())
    }
}

/// Load and fold every event matching the model's query.
pub async fn load<L, M>(log: &L, model: &mut M) -> Result<(), EventstoreError>
where
    L: EventLog + ?Sized,
    M: QueryReducer + ?Sized,
{
    let query = model.search_query();
    if query.items.is_empty() {
        return Ok(());
    }
    let events = log.filter(&query).await?;
    debug!(count = events.len(), "loaded events");
    model.append_events(events);
    model.reduce()
}

/// Load several models with a single filter round trip.
///
/// Each model receives the subset of events its own query matches.
pub async fn load_many<L>(
    log: &L,
    models: &mut [&mut dyn QueryReducer],
) -> Result<(), EventstoreError>
where
    L: EventLog + ?Sized,
{
    let queries: Vec<_> = models.iter().map(|model| model.search_query()).collect();
    let combined = queries
        .iter()
        .cloned()
        .fold(SearchQuery::new(), SearchQuery::merge);
    if combined.items.is_empty() {
        return Ok(());
    }

    let events = log.filter(&combined).await?;
    debug!(count = events.len(), models = models.len(), "loaded events");
    for (model, query) in models.iter_mut().zip(&queries) {
        let relevant = events
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect();
        model.append_events(relevant);
        model.reduce()?;
    }
    Ok(())
}
