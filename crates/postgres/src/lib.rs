use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use idpstore_eventstore::{
    error::EventstoreError,
    event::{Aggregate, AggregateType, StoredEvent},
    log::EventLog,
    push::Push,
    query::{QueryItem, SearchQuery},
};
use serde_json::Value;
use sqlx::{PgPool, PgTransaction, Postgres, QueryBuilder, Row, postgres::PgRow, types::Json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const DEFAULT_EVENTS_TABLE_NAME: &str = "events";

const SELECT_COLUMNS: &str = "position, id, instance_id, resource_owner, aggregate_type, \
     aggregate_id, sequence, event_type, payload, creator, created_at";

const ADVISORY_LOCK: &str = "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))";

/// (instance id, aggregate type, aggregate id)
type StreamKey = (String, String, String);

/// An [`EventLog`] stored in a single PostgreSQL table.
///
/// Pushes take a transaction-scoped advisory lock per touched stream and
/// then lock its tail row with `FOR UPDATE`, so preconditions on streams
/// without rows are serialized as well. The unique key on the stream
/// sequence backs this up.
#[derive(Clone, Debug)]
pub struct PostgresEventLog {
    pool: PgPool,
    table: Arc<str>,
}

pub struct PostgresEventLogBuilder {
    pool: PgPool,
    table: Arc<str>,
}

impl PostgresEventLogBuilder {
    pub fn new(pool: PgPool) -> Self {
        PostgresEventLogBuilder {
            pool,
            table: DEFAULT_EVENTS_TABLE_NAME.into(),
        }
    }

    pub fn table(mut self, table: impl Into<Arc<str>>) -> Self {
        self.table = table.into();
        self
    }

    pub fn build(self) -> PostgresEventLog {
        PostgresEventLog {
            pool: self.pool,
            table: self.table,
        }
    }
}

impl PostgresEventLog {
    pub fn new(pool: PgPool) -> Self {
        PostgresEventLogBuilder::new(pool).build()
    }

    pub fn builder(pool: PgPool) -> PostgresEventLogBuilder {
        PostgresEventLogBuilder::new(pool)
    }

    /// Connect to `database_url` with a default pool and table.
    pub async fn connect(database_url: &str) -> Result<Self, EventstoreError> {
        let pool = PgPool::connect(database_url).await.map_err(storage_error)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the events table and its indexes if they don't exist.
    pub async fn migrate(&self) -> Result<(), EventstoreError> {
        for statement in migration_statements(&self.table) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }

    /// Lock the stream and return its current tail sequence.
    async fn lock_tail(
        &self,
        tx: &mut PgTransaction<'static>,
        key: &StreamKey,
    ) -> Result<u64, EventstoreError> {
        let (instance_id, aggregate_type, aggregate_id) = key;
        // Row locks miss streams without events; the advisory lock covers those.
        sqlx::query(ADVISORY_LOCK)
            .bind(lock_key(&self.table, key))
            .execute(&mut **tx)
            .await
            .map_err(storage_error)?;

        let tail = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT sequence FROM {} WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3 \
             ORDER BY sequence DESC LIMIT 1 FOR UPDATE",
            self.table,
        ))
        .bind(instance_id)
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?;

        Ok(tail.map(|seq| seq as u64).unwrap_or(0))
    }
}

impl EventLog for PostgresEventLog {
    #[instrument(skip_all, fields(events = push.events.len(), table = %self.table))]
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>, EventstoreError> {
        if push.events.is_empty() && push.preconditions.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Locks are taken in key order so concurrent pushes cannot deadlock.
        let mut tails: BTreeMap<StreamKey, u64> = BTreeMap::new();
        for key in push
            .preconditions
            .iter()
            .map(|precondition| stream_key(&precondition.aggregate))
            .chain(push.events.iter().map(|event| stream_key(&event.aggregate)))
        {
            tails.entry(key).or_insert(0);
        }
        for (key, tail) in tails.iter_mut() {
            *tail = self.lock_tail(&mut tx, key).await?;
        }

        for precondition in &push.preconditions {
            let actual = tails
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

        let insert = format!(
            "INSERT INTO {} (id, instance_id, resource_owner, aggregate_type, aggregate_id, sequence, \
             event_type, payload, creator) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING position, created_at",
            self.table,
        );

        let mut stored = Vec::with_capacity(push.events.len());
        for pending in push.events {
            let tail = tails.entry(stream_key(&pending.aggregate)).or_insert(0);
            *tail += 1;
            let sequence = *tail;
            let id = Uuid::new_v4();

            let row = sqlx::query(&insert)
                .bind(id)
                .bind(&pending.aggregate.instance_id)
                .bind(&pending.aggregate.resource_owner)
                .bind(pending.aggregate.typ.as_str())
                .bind(&pending.aggregate.id)
                .bind(sequence as i64)
                .bind(&pending.event_type)
                .bind(Json(&pending.payload))
                .bind(&push.creator)
                .fetch_one(&mut *tx)
                .await
                .map_err(|err| {
                    if let sqlx::Error::Database(ref db_err) = err {
                        if db_err.code().as_deref() == Some("23505") {
                            return EventstoreError::ConcurrencyConflict {
                                aggregate_type: pending.aggregate.typ.to_string(),
                                aggregate_id: pending.aggregate.id.clone(),
                                expected: sequence - 1,
                                actual: sequence,
                            };
                        }
                    }
                    storage_error(err)
                })?;

            let position: i64 = row.try_get("position").map_err(storage_error)?;
            let created_at: DateTime<Utc> = row.try_get("created_at").map_err(storage_error)?;
            stored.push(StoredEvent {
                id,
                position: position as u64,
                aggregate: pending.aggregate,
                sequence,
                event_type: pending.event_type,
                payload: pending.payload,
                creator: push.creator.clone(),
                created_at,
            });
        }

        tx.commit().await.map_err(storage_error)?;
        debug!(count = stored.len(), "appended events");

        Ok(stored)
    }

    #[instrument(skip_all, fields(items = query.items.len(), table = %self.table))]
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventstoreError> {
        if query.items.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = select_events(&self.table, query);
        let mut rows = builder.build().fetch(&self.pool);
        let mut events = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(storage_error)? {
            events.push(event_from_row(&row)?);
        }

        Ok(events)
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        if query.items.is_empty() {
            return Ok(0);
        }

        let mut builder = select_latest_sequence(&self.table, query);
        let sequence: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(sequence as u64)
    }

    async fn health(&self) -> Result<(), EventstoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

fn storage_error(err: sqlx::Error) -> EventstoreError {
    EventstoreError::storage(err.to_string())
}

fn lock_key(table: &str, (instance_id, aggregate_type, aggregate_id): &StreamKey) -> String {
    format!("{table}/{instance_id}/{aggregate_type}/{aggregate_id}")
}

fn stream_key(aggregate: &Aggregate) -> StreamKey {
    (
        aggregate.instance_id.clone(),
        aggregate.typ.to_string(),
        aggregate.id.clone(),
    )
}

fn migration_statements(table: &str) -> [String; 3] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                position BIGSERIAL PRIMARY KEY,
                id UUID NOT NULL,
                instance_id TEXT NOT NULL,
                resource_owner TEXT NOT NULL,
                aggregate_type TEXT NOT NULL,
                aggregate_id TEXT NOT NULL,
                sequence BIGINT NOT NULL,
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                creator TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (instance_id, aggregate_type, aggregate_id, sequence)
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_event_type_idx ON {table} (instance_id, event_type)"
        ),
        format!("CREATE INDEX IF NOT EXISTS {table}_payload_idx ON {table} USING GIN (payload)"),
    ]
}

fn select_events<'a>(table: &str, query: &SearchQuery) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM {table} WHERE "));
    push_where(&mut builder, query);
    builder.push(" ORDER BY position");
    builder
}

fn select_latest_sequence<'a>(table: &str, query: &SearchQuery) -> QueryBuilder<'a, Postgres> {
    let mut builder =
        QueryBuilder::new(format!("SELECT COALESCE(MAX(sequence), 0) FROM {table} WHERE "));
    push_where(&mut builder, query);
    builder
}

/// Render `(item) OR (item) ...`, each item a conjunction of its filters.
fn push_where(builder: &mut QueryBuilder<'_, Postgres>, query: &SearchQuery) {
    for (i, item) in query.items.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder.push("(");
        push_item(builder, item);
        builder.push(")");
    }
}

fn push_item(builder: &mut QueryBuilder<'_, Postgres>, item: &QueryItem) {
    builder.push("TRUE");
    if let Some(instance_id) = &item.instance_id {
        builder.push(" AND instance_id = ").push_bind(instance_id.clone());
    }
    if let Some(resource_owner) = &item.resource_owner {
        builder
            .push(" AND resource_owner = ")
            .push_bind(resource_owner.clone());
    }
    if !item.aggregate_types.is_empty() {
        let types: Vec<String> = item
            .aggregate_types
            .iter()
            .map(|typ| typ.to_string())
            .collect();
        builder
            .push(" AND aggregate_type = ANY(")
            .push_bind(types)
            .push(")");
    }
    if !item.aggregate_ids.is_empty() {
        builder
            .push(" AND aggregate_id = ANY(")
            .push_bind(item.aggregate_ids.clone())
            .push(")");
    }
    if !item.event_types.is_empty() {
        builder
            .push(" AND event_type = ANY(")
            .push_bind(item.event_types.clone())
            .push(")");
    }
    if !item.event_data.is_empty() {
        builder
            .push(" AND payload @> ")
            .push_bind(Json(Value::Object(item.event_data.clone())));
    }
}

fn event_from_row(row: &PgRow) -> Result<StoredEvent, EventstoreError> {
    let position: i64 = row.try_get("position").map_err(storage_error)?;
    let sequence: i64 = row.try_get("sequence").map_err(storage_error)?;
    let aggregate_type: String = row.try_get("aggregate_type").map_err(storage_error)?;
    let Json(payload): Json<Value> = row.try_get("payload").map_err(storage_error)?;

    Ok(StoredEvent {
        id: row.try_get("id").map_err(storage_error)?,
        position: position as u64,
        aggregate: Aggregate {
            id: row.try_get("aggregate_id").map_err(storage_error)?,
            typ: AggregateType::new(aggregate_type),
            resource_owner: row.try_get("resource_owner").map_err(storage_error)?,
            instance_id: row.try_get("instance_id").map_err(storage_error)?,
        },
        sequence: sequence as u64,
        event_type: row.try_get("event_type").map_err(storage_error)?,
        payload,
        creator: row.try_get("creator").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn instance() -> AggregateType {
        AggregateType::from_static("instance")
    }

    #[test]
    fn select_renders_items_as_disjunction() {
        let query = SearchQuery::new()
            .or(QueryItem::new()
                .instance_id("instance-1")
                .aggregate_types([instance()])
                .aggregate_ids(["idp-1"])
                .event_types(["idp.oauth.added", "idp.oauth.changed"]))
            .or(QueryItem::new().resource_owner("org-1"));

        let builder = select_events("events", &query);

        assert_eq!(
            builder.sql(),
            format!(
                "SELECT {SELECT_COLUMNS} FROM events WHERE \
                 (TRUE AND instance_id = $1 AND aggregate_type = ANY($2) AND aggregate_id = ANY($3) \
                 AND event_type = ANY($4)) OR (TRUE AND resource_owner = $5) ORDER BY position"
            )
        );
    }

    #[test]
    fn event_data_renders_containment() {
        let data = json!({ "idpConfigId": "idp-1" }).as_object().cloned().unwrap();
        let query = SearchQuery::with_items([QueryItem::new().event_data(data)]);

        let builder = select_latest_sequence("idp_events", &query);

        assert_eq!(
            builder.sql(),
            "SELECT COALESCE(MAX(sequence), 0) FROM idp_events WHERE (TRUE AND payload @> $1)"
        );
    }

    #[test]
    fn empty_item_matches_all_rows() {
        let query = SearchQuery::with_items([QueryItem::new()]);
        let builder = select_latest_sequence("events", &query);
        assert!(builder.sql().ends_with("WHERE (TRUE)"));
    }

    #[test]
    fn migration_uses_configured_table() {
        let statements = migration_statements("idp_events");
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS idp_events ("));
        assert!(statements[0].contains("UNIQUE (instance_id, aggregate_type, aggregate_id, sequence)"));
        assert!(statements[1].contains("idp_events_event_type_idx ON idp_events"));
        assert!(statements[2].contains("USING GIN (payload)"));
    }

    #[test]
    fn stream_keys_order_by_instance_then_type_then_id() {
        let a = Aggregate::new("b", instance(), "org", "i1");
        let b = Aggregate::new("a", AggregateType::from_static("org"), "org", "i1");
        let c = Aggregate::new("a", instance(), "org", "i0");

        let mut keys = vec![stream_key(&a), stream_key(&b), stream_key(&c)];
        keys.sort();

        assert_eq!(keys[0].0, "i0");
        assert_eq!(keys[1], ("i1".to_string(), "instance".to_string(), "b".to_string()));
        assert_eq!(keys[2].1, "org");
    }

    #[test]
    fn lock_keys_separate_scopes_and_tables() {
        let instance_stream = stream_key(&Aggregate::new("idp-1", instance(), "i1", "i1"));
        let org_stream =
            stream_key(&Aggregate::new("idp-1", AggregateType::from_static("org"), "o1", "i1"));

        assert_eq!(lock_key("events", &instance_stream), "events/i1/instance/idp-1");
        assert_ne!(lock_key("events", &instance_stream), lock_key("events", &org_stream));
        assert_ne!(lock_key("events", &org_stream), lock_key("other", &org_stream));
    }
}
