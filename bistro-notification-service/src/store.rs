use std::collections::HashSet;

use async_trait::async_trait;
use bistro_common::{connection, DbPool, StoreError};
use chrono::{DateTime, Utc};
use diesel::{insert_into, prelude::*};
use diesel_async::RunQueryDsl;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{NotificationKind, NotificationRecord};
use crate::schema;

/// Append-only notification log.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn append(&self, record: &NotificationRecord) -> Result<(), StoreError>;

    /// Returns the subset of `reference_ids` that have a record of `kind`
    /// created after `since`.
    async fn referenced_since(
        &self,
        kind: NotificationKind,
        reference_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashSet<Uuid>, StoreError>;

    async fn list_for_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, StoreError>;
}

pub struct PgNotificationLog {
    pool: DbPool,
}

impl PgNotificationLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLog for PgNotificationLog {
    async fn append(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let conn = &mut connection(&self.pool).await?;
        insert_into(schema::notifications::table)
            .values(record)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn referenced_since(
        &self,
        kind: NotificationKind,
        reference_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashSet<Uuid>, StoreError> {
        use schema::notifications::dsl;

        if reference_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = &mut connection(&self.pool).await?;
        let ids = dsl::notifications
            .select(dsl::reference_id)
            .filter(dsl::kind.eq(kind))
            .filter(dsl::reference_id.eq_any(reference_ids.to_vec()))
            .filter(dsl::created_at.gt(since))
            .distinct()
            .load::<Option<Uuid>>(conn)
            .await?;
        Ok(ids.into_iter().flatten().collect())
    }

    async fn list_for_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        use schema::notifications::dsl;

        let conn = &mut connection(&self.pool).await?;
        Ok(dsl::notifications
            .select(NotificationRecord::as_select())
            .filter(dsl::reference_id.eq(reference_id))
            .order(dsl::created_at.asc())
            .load(conn)
            .await?)
    }
}

#[derive(Default)]
pub struct MemoryNotificationLog {
    records: Mutex<Vec<NotificationRecord>>,
}

impl MemoryNotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl NotificationLog for MemoryNotificationLog {
    async fn append(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn referenced_since(
        &self,
        kind: NotificationKind,
        reference_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashSet<Uuid>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.kind == kind && r.created_at > since)
            .filter_map(|r| r.reference_id)
            .filter(|id| reference_ids.contains(id))
            .collect())
    }

    async fn list_for_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.reference_id == Some(reference_id))
            .cloned()
            .collect())
    }
}
