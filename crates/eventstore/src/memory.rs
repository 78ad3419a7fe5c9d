use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::EventstoreError,
    event::{AggregateType, StoredEvent},
    log::EventLog,
    push::Push,
    query::SearchQuery,
};

type StreamKey = (String, AggregateType, String);

/// An [`EventLog`] held entirely in memory.
///
/// Used by tests and single-process deployments. Every push runs under one
/// write lock, so precondition checks and appends are serialized.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<StoredEvent>,
    /// Last sequence per (instance, aggregate type, aggregate id).
    tails: HashMap<StreamKey, u64>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage. While set, every call fails with a storage error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored events across all streams.
    pub async fn len(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.events.is_empty()
    }

    fn check_available(&self) -> Result<(), EventstoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventstoreError::storage("in-memory event log is unavailable"));
        }
        Ok(())
    }
}

fn stream_key(aggregate: &crate::event::Aggregate) -> StreamKey {
    (
        aggregate.instance_id.clone(),
        aggregate.typ.clone(),
        aggregate.id.clone(),
    )
}

impl EventLog for InMemoryEventLog {
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>, EventstoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        for precondition in &push.preconditions {
            let actual = state
                .tails
                .get(&stream_key(&precondition.aggregate))
                .copied()
                .unwrap_or(0);
            if actual != precondition.expected_sequence {
                warn!(
                    aggregate_type = %precondition.aggregate.typ,
                    aggregate_id = %precondition.aggregate.id,
                    expected = precondition.expected_sequence,
                    actual,
                    "push precondition failed"
                );
                return Err(EventstoreError::ConcurrencyConflict {
                    aggregate_type: precondition.aggregate.typ.to_string(),
                    aggregate_id: precondition.aggregate.id.clone(),
                    expected: precondition.expected_sequence,
                    actual,
                });
            }
        }

        let created_at = Utc::now();
        let mut stored = Vec::with_capacity(push.events.len());
        for pending in push.events {
            let tail = state.tails.entry(stream_key(&pending.aggregate)).or_insert(0);
            *tail += 1;
            let sequence = *tail;
            let position = state.events.len() as u64 + stored.len() as u64 + 1;
            stored.push(StoredEvent {
                id: Uuid::new_v4(),
                position,
                aggregate: pending.aggregate,
                sequence,
                event_type: pending.event_type,
                payload: pending.payload,
                creator: push.creator.clone(),
                created_at,
            });
        }

        state.events.extend(stored.iter().cloned());
        debug!(count = stored.len(), "appended events");

        Ok(stored)
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventstoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect())
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| query.matches(event))
            .map(|event| event.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn health(&self) -> Result<(), EventstoreError> {
        self.check_available()
    }
}
