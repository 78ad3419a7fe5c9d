use std::{borrow::Cow, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SerializationError;

/// The kind of aggregate an event stream belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateType(Cow<'static, str>);

impl AggregateType {
    pub const fn from_static(name: &'static str) -> Self {
        AggregateType(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        AggregateType(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one event stream and the tenant that owns it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregate {
    pub id: String,
    pub typ: AggregateType,
    pub resource_owner: String,
    pub instance_id: String,
}

impl Aggregate {
    pub fn new(
        id: impl Into<String>,
        typ: AggregateType,
        resource_owner: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Aggregate {
            id: id.into(),
            typ,
            resource_owner: resource_owner.into(),
            instance_id: instance_id.into(),
        }
    }
}

/// An event as persisted in the log.
///
/// `sequence` is assigned at push time and is gapless within one
/// aggregate stream. `position` orders events across all streams.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub position: u64,
    pub aggregate: Aggregate,
    pub sequence: u64,
    pub event_type: String,
    pub payload: Value,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Deserialize the payload into a concrete event.
    pub fn decode<E: Event>(&self) -> Result<E, SerializationError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Trait for individual event payloads.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Event, Clone, Serialize, Deserialize)]
/// #[event_type("idp.oauth.added")]
/// pub struct OAuthIdpAdded {
///     pub id: String,
///     pub name: String,
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned + Sized {
    /// The event type tag as it appears in the log.
    const EVENT_TYPE: &'static str;
}

/// Trait for a closed set of events that a write model reads.
///
/// This is derived on a user-defined enum that wraps the event types
/// the write model cares about. It is used to:
///
/// 1. Know which event types to fetch from the log
/// 2. Deserialize events into the correct variant
///
/// # Example
///
/// ```rust,ignore
/// #[derive(EventSet)]
/// enum OAuthIdpEvent {
///     Added(OAuthIdpAdded),
///     Changed(OAuthIdpChanged),
///     Removed(IdpRemoved),
/// }
/// ```
pub trait EventSet: Sized {
    /// Returns the event type tags this set can contain.
    /// Used to build the query to the event log.
    const EVENT_TYPES: &'static [&'static str];

    /// Attempt to deserialize an event into this set.
    ///
    /// Returns `None` if the event type is not part of this set,
    /// or `Some(Err(...))` if deserialization fails.
    fn from_event(event_type: &str, data: Value) -> Option<Result<Self, SerializationError>>;
}

/// The empty event set, for write models without legacy history.
#[derive(Clone, Copy, Debug)]
pub enum NoEvents {}

impl EventSet for NoEvents {
    const EVENT_TYPES: &'static [&'static str] = &[];

    fn from_event(_event_type: &str, _data: Value) -> Option<Result<Self, SerializationError>> {
        None
    }
}
