use serde_json::Value;

use crate::{
    error::SerializationError,
    event::{Aggregate, Event},
};

/// An atomic batch of events to append to the log.
///
/// Built using the builder pattern:
///
/// ```rust,ignore
/// let push = Push::new("editor-1")
///     .expect(&aggregate, model.processed_sequence)
///     .event(&aggregate, OAuthIdpChanged { ... })?;
/// ```
///
/// Either every event is appended or none is.
#[derive(Clone, Debug)]
pub struct Push {
    pub creator: String,
    pub preconditions: Vec<Precondition>,
    pub events: Vec<PendingEvent>,
}

/// Requires an aggregate stream to still end at `expected_sequence`.
///
/// A stream without events is at sequence 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Precondition {
    pub aggregate: Aggregate,
    pub expected_sequence: u64,
}

/// A serialized event ready for persistence.
#[derive(Clone, Debug)]
pub struct PendingEvent {
    pub aggregate: Aggregate,
    /// The event type tag
    pub event_type: String,
    /// The serialized event data (JSON)
    pub payload: Value,
}

impl Push {
    /// Create a new empty push on behalf of `creator`.
    pub fn new(creator: impl Into<String>) -> Self {
        Push {
            creator: creator.into(),
            preconditions: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Fail the push if `aggregate`'s stream moved past `expected_sequence`.
    pub fn expect(mut self, aggregate: &Aggregate, expected_sequence: u64) -> Self {
        self.preconditions.push(Precondition {
            aggregate: aggregate.clone(),
            expected_sequence,
        });
        self
    }

    /// Add an event, returning an error if serialization fails.
    pub fn event<E: Event>(
        mut self,
        aggregate: &Aggregate,
        event: E,
    ) -> Result<Self, SerializationError> {
        self.events.push(PendingEvent::new(aggregate, event)?);
        Ok(self)
    }

    /// Add an already serialized event.
    pub fn pending(mut self, event: PendingEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Returns true if no events will be appended.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of events to be appended.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the push contains this event type.
    pub fn contains_event_type<E: Event>(&self) -> bool {
        self.events
            .iter()
            .any(|event| event.event_type == E::EVENT_TYPE)
    }
}

impl PendingEvent {
    pub fn new<E: Event>(aggregate: &Aggregate, event: E) -> Result<Self, SerializationError> {
        Ok(PendingEvent {
            aggregate: aggregate.clone(),
            event_type: E::EVENT_TYPE.to_string(),
            payload: serde_json::to_value(event)?,
        })
    }
}
