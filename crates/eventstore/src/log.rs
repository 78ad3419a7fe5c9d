use crate::{error::EventstoreError, event::StoredEvent, push::Push, query::SearchQuery};

/// Durable, append-only event storage.
///
/// Implementations must guarantee that:
///
/// - `push` is atomic: all events of a [`Push`] are appended or none are.
/// - every [`Precondition`](crate::push::Precondition) is checked against the
///   stream tail inside the same critical section as the append.
/// - sequences within one aggregate stream are consecutive, starting at 1.
/// - `filter` returns events in the order they were appended.
pub trait EventLog: Send + Sync {
    /// Append a batch of events, returning them as stored.
    fn push(
        &self,
        push: Push,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, EventstoreError>> + Send;

    /// Read every event matching the query, in append order.
    fn filter(
        &self,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, EventstoreError>> + Send;

    /// The highest sequence among events matching the query, or 0.
    fn latest_sequence(
        &self,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<u64, EventstoreError>> + Send;

    /// Check that the backend is reachable.
    fn health(&self) -> impl Future<Output = Result<(), EventstoreError>> + Send;
}

impl<L: EventLog> EventLog for &L {
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>, EventstoreError> {
        (**self).push(push).await
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventstoreError> {
        (**self).filter(query).await
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        (**self).latest_sequence(query).await
    }

    async fn health(&self) -> Result<(), EventstoreError> {
        (**self).health().await
    }
}

impl<L: EventLog> EventLog for std::sync::Arc<L> {
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>, EventstoreError> {
        (**self).push(push).await
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventstoreError> {
        (**self).filter(query).await
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        (**self).latest_sequence(query).await
    }

    async fn health(&self) -> Result<(), EventstoreError> {
        (**self).health().await
    }
}
