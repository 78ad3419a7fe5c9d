use serde_json::{Map, Value};

use crate::event::{AggregateType, StoredEvent};

/// A filter over the event log.
///
/// An event matches the query when it matches at least one item.
/// A query without items matches nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    pub items: Vec<QueryItem>,
}

impl SearchQuery {
    pub fn new() -> Self {
        SearchQuery { items: Vec::new() }
    }

    pub fn with_items(items: impl IntoIterator<Item = QueryItem>) -> Self {
        SearchQuery {
            items: items.into_iter().collect(),
        }
    }

    /// Add an alternative item to the query.
    pub fn or(mut self, item: QueryItem) -> Self {
        self.items.push(item);
        self
    }

    /// Merge the items of another query into this one.
    pub fn merge(mut self, other: SearchQuery) -> Self {
        self.items.extend(other.items);
        self
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        self.items.iter().any(|item| item.matches(event))
    }
}

/// A conjunction of filters. Empty lists place no constraint.
///
/// ```rust,ignore
/// QueryItem::new()
///     .instance_id("instance-1")
///     .aggregate_types([AggregateType::from_static("instance")])
///     .event_types(["idp.removed"])
///     .event_data(json!({ "id": "idp-1" }).as_object().cloned().unwrap_or_default())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryItem {
    pub instance_id: Option<String>,
    pub resource_owner: Option<String>,
    pub aggregate_types: Vec<AggregateType>,
    pub aggregate_ids: Vec<String>,
    pub event_types: Vec<String>,
    /// Top-level payload fields that must be present with exactly these values.
    pub event_data: Map<String, Value>,
}

impl QueryItem {
    pub fn new() -> Self {
        QueryItem::default()
    }

    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = Some(resource_owner.into());
        self
    }

    pub fn aggregate_types(mut self, types: impl IntoIterator<Item = AggregateType>) -> Self {
        self.aggregate_types.extend(types);
        self
    }

    pub fn aggregate_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.aggregate_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn event_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.event_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn event_data(mut self, data: Map<String, Value>) -> Self {
        self.event_data.extend(data);
        self
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        if let Some(instance_id) = &self.instance_id {
            if &event.aggregate.instance_id != instance_id {
                return false;
            }
        }
        if let Some(resource_owner) = &self.resource_owner {
            if &event.aggregate.resource_owner != resource_owner {
                return false;
            }
        }
        if !self.aggregate_types.is_empty() && !self.aggregate_types.contains(&event.aggregate.typ)
        {
            return false;
        }
        if !self.aggregate_ids.is_empty() && !self.aggregate_ids.contains(&event.aggregate.id) {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        self.event_data
            .iter()
            .all(|(key, value)| event.payload.get(key) == Some(value))
    }
}
