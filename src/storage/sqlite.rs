use crate::analytics::{FirstSeen, Predicate};
use crate::models::{DomainId, EventRecord, Field};
use crate::storage::sql::{self, EventRow};
use crate::storage::{EventStore, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl EventStore for SqliteStorage {
    async fn init(&self) -> StorageResult<()> {
        sqlx::query(sql::CREATE_EVENTS_TABLE)
            .execute(self.pool.as_ref())
            .await?;

        for statement in sql::CREATE_EVENTS_INDEXES {
            sqlx::query(statement).execute(self.pool.as_ref()).await?;
        }

        Ok(())
    }

    async fn insert(&self, record: &EventRecord) -> StorageResult<()> {
        record.validate()?;

        let mut builder = QueryBuilder::<Sqlite>::new("");
        sql::push_insert(&mut builder, record);

        let result = builder.build().execute(self.pool.as_ref()).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(())
    }

    async fn query(
        &self,
        domain_id: &DomainId,
        predicate: &Predicate,
    ) -> StorageResult<Vec<EventRecord>> {
        if predicate.domain_id != *domain_id {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM events WHERE ", sql::EVENT_COLUMNS));
        sql::push_scope(&mut builder, predicate);

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(EventRecord::try_from).collect()
    }

    async fn first_seen(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
    ) -> StorageResult<Vec<FirstSeen>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("");
        sql::push_first_seen(&mut builder, domain_id, fields);

        let rows = builder.build().fetch_all(self.pool.as_ref()).await?;
        let mut markers = rows
            .iter()
            .map(|row| sql::decode_first_seen(row, fields))
            .collect::<StorageResult<Vec<_>>>()?;
        crate::analytics::novelty::sort_first_seen(&mut markers);

        Ok(markers)
    }

    async fn has_records(&self, domain_id: &DomainId) -> StorageResult<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT 1 FROM events WHERE domain_id = ");
        builder.push_bind(domain_id.to_string()).push(" LIMIT 1");

        let row = builder.build().fetch_optional(self.pool.as_ref()).await?;
        Ok(row.is_some())
    }
}
