//! The ten identity provider kinds.
//!
//! Every kind follows the same shape: Added and Changed events, a change
//! enum with one entry per field, a write model folding its stream, and a
//! desired configuration that write model can diff against.

pub mod azure_ad;
pub mod github;
pub mod github_enterprise;
pub mod gitlab;
pub mod gitlab_self_hosted;
pub mod google;
pub mod jwt;
pub mod ldap;
pub mod oauth;
pub mod oidc;

use idpstore_eventstore::prelude::*;

use crate::{domain::OwnerScope, error::ValidationError};

/// The stream of one provider, restricted to the model's event types.
pub(crate) fn stream_query<R: Reducer>(model: &R, scope: OwnerScope) -> SearchQuery {
    let base = model.write_model();
    SearchQuery::with_items([QueryItem::new()
        .instance_id(base.instance_id.clone())
        .resource_owner(base.resource_owner.clone())
        .aggregate_types([scope.aggregate_type()])
        .aggregate_ids([base.aggregate_id.clone()])
        .event_types(
            R::Events::EVENT_TYPES
                .iter()
                .chain(R::LegacyEvents::EVENT_TYPES)
                .copied(),
        )])
}

pub(crate) fn required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::invalid_argument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

/// Reject a changed event without changes.
pub(crate) fn ensure_changes<C>(changes: &[C]) -> Result<(), ValidationError> {
    if changes.is_empty() {
        return Err(ValidationError::no_changes());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{TimeZone, Utc};
    use idpstore_crypto::{AesCrypto, Key, KeyConfig, MemoryKeyStorage};
    use idpstore_eventstore::prelude::*;
    use uuid::Uuid;

    use crate::domain::Owner;

    pub fn alg() -> AesCrypto {
        let storage = MemoryKeyStorage::with_keys([Key::generate("idp-key")]);
        AesCrypto::new(&KeyConfig::new("idp-key"), &storage).unwrap()
    }

    pub fn owner() -> Owner {
        Owner::org("instance-1", "org-1")
    }

    /// Builds one provider stream with consecutive sequences.
    pub struct Stream {
        aggregate: Aggregate,
        events: Vec<StoredEvent>,
    }

    impl Stream {
        pub fn new(id: &str) -> Self {
            Stream {
                aggregate: owner().aggregate(id),
                events: Vec::new(),
            }
        }

        pub fn then<E: Event>(mut self, event: E) -> Self {
            let sequence = self.events.len() as u64 + 1;
            self.events.push(stored(&self.aggregate, sequence, event));
            self
        }

        pub fn build(self) -> Vec<StoredEvent> {
            self.events
        }
    }

    pub fn stored<E: Event>(aggregate: &Aggregate, sequence: u64, event: E) -> StoredEvent {
        StoredEvent {
            id: Uuid::new_v4(),
            position: sequence,
            aggregate: aggregate.clone(),
            sequence,
            event_type: E::EVENT_TYPE.to_string(),
            payload: serde_json::to_value(event).unwrap(),
            creator: "tester".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::seconds(sequence as i64),
        }
    }

    pub fn replay<M: QueryReducer>(model: &mut M, events: Vec<StoredEvent>) {
        model.append_events(events);
        model.reduce().unwrap();
    }
}
