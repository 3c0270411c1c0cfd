use std::collections::HashMap;

use async_trait::async_trait;
use bistro_common::{connection, DbPool, StoreError};
use chrono::{DateTime, Utc};
use diesel::{insert_into, prelude::*, update};
use diesel_async::RunQueryDsl;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Category, MenuItem, Modifier, ModifierGroup, SettingRow, Special};
use crate::schema;

/// Raw catalog rows, unfiltered and unsorted.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub categories: Vec<Category>,
    pub items: Vec<MenuItem>,
    pub groups: Vec<ModifierGroup>,
    pub modifiers: Vec<Modifier>,
    pub specials: Vec<Special>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_catalog(&self) -> Result<CatalogSnapshot, StoreError>;

    /// Items with their modifier groups and modifiers. Categories and
    /// specials are left empty.
    async fn load_items(&self, ids: &[Uuid]) -> Result<CatalogSnapshot, StoreError>;

    /// Returns `false` when no such item exists.
    async fn set_item_availability(
        &self,
        id: Uuid,
        is_available: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn update_item_price(
        &self,
        id: Uuid,
        price: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SettingStore: Send + Sync {
    async fn load_settings(&self) -> Result<Vec<SettingRow>, StoreError>;

    async fn upsert_setting(&self, row: &SettingRow) -> Result<(), StoreError>;
}

pub struct PgCatalogStore {
    pool: DbPool,
}

impl PgCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn load_catalog(&self) -> Result<CatalogSnapshot, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(CatalogSnapshot {
            categories: schema::categories::table
                .select(Category::as_select())
                .load(conn)
                .await?,
            items: schema::menu_items::table
                .select(MenuItem::as_select())
                .load(conn)
                .await?,
            groups: schema::modifier_groups::table
                .select(ModifierGroup::as_select())
                .load(conn)
                .await?,
            modifiers: schema::modifiers::table
                .select(Modifier::as_select())
                .load(conn)
                .await?,
            specials: schema::specials::table
                .select(Special::as_select())
                .load(conn)
                .await?,
        })
    }

    async fn load_items(&self, ids: &[Uuid]) -> Result<CatalogSnapshot, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        let items = schema::menu_items::table
            .select(MenuItem::as_select())
            .filter(schema::menu_items::id.eq_any(ids.to_vec()))
            .load(conn)
            .await?;
        let groups = ModifierGroup::belonging_to(&items)
            .select(ModifierGroup::as_select())
            .load(conn)
            .await?;
        let modifiers = Modifier::belonging_to(&groups)
            .select(Modifier::as_select())
            .load(conn)
            .await?;
        Ok(CatalogSnapshot {
            items,
            groups,
            modifiers,
            ..Default::default()
        })
    }

    async fn set_item_availability(
        &self,
        id: Uuid,
        is_available: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        use schema::menu_items::dsl;

        let conn = &mut connection(&self.pool).await?;
        let updated = update(dsl::menu_items.find(id))
            .set((dsl::is_available.eq(is_available), dsl::updated_at.eq(now)))
            .execute(conn)
            .await?;
        Ok(updated == 1)
    }

    async fn update_item_price(
        &self,
        id: Uuid,
        price: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        use schema::menu_items::dsl;

        let conn = &mut connection(&self.pool).await?;
        let updated = update(dsl::menu_items.find(id))
            .set((dsl::price.eq(price), dsl::updated_at.eq(now)))
            .execute(conn)
            .await?;
        Ok(updated == 1)
    }
}

pub struct PgSettingStore {
    pool: DbPool,
}

impl PgSettingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingStore for PgSettingStore {
    async fn load_settings(&self) -> Result<Vec<SettingRow>, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(schema::settings::table
            .select(SettingRow::as_select())
            .load(conn)
            .await?)
    }

    async fn upsert_setting(&self, row: &SettingRow) -> Result<(), StoreError> {
        let conn = &mut connection(&self.pool).await?;
        insert_into(schema::settings::table)
            .values(row)
            .on_conflict(schema::settings::key)
            .do_update()
            .set(row)
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// In-process catalog for tests and local runs.
#[derive(Default)]
pub struct MemoryCatalogStore {
    inner: Mutex<CatalogSnapshot>,
}

impl MemoryCatalogStore {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn load_catalog(&self) -> Result<CatalogSnapshot, StoreError> {
        Ok(self.inner.lock().await.clone())
    }

    async fn load_items(&self, ids: &[Uuid]) -> Result<CatalogSnapshot, StoreError> {
        let inner = self.inner.lock().await;
        let items: Vec<MenuItem> = inner
            .items
            .iter()
            .filter(|item| ids.contains(&item.id))
            .cloned()
            .collect();
        let groups: Vec<ModifierGroup> = inner
            .groups
            .iter()
            .filter(|group| items.iter().any(|item| item.id == group.menu_item_id))
            .cloned()
            .collect();
        let modifiers = inner
            .modifiers
            .iter()
            .filter(|modifier| groups.iter().any(|group| group.id == modifier.group_id))
            .cloned()
            .collect();
        Ok(CatalogSnapshot {
            items,
            groups,
            modifiers,
            ..Default::default()
        })
    }

    async fn set_item_availability(
        &self,
        id: Uuid,
        is_available: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.is_available = is_available;
                item.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn update_item_price(
        &self,
        id: Uuid,
        price: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.price = price;
                item.updated_at = now;
                true
            }
            None => false,
        })
    }
}

#[derive(Default)]
pub struct MemorySettingStore {
    rows: Mutex<HashMap<String, SettingRow>>,
}

impl MemorySettingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingStore for MemorySettingStore {
    async fn load_settings(&self) -> Result<Vec<SettingRow>, StoreError> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn upsert_setting(&self, row: &SettingRow) -> Result<(), StoreError> {
        self.rows
            .lock()
            .await
            .insert(row.key.clone(), row.clone());
        Ok(())
    }
}
