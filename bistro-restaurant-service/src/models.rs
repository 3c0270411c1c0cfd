use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{categories, menu_items, modifier_groups, modifiers, settings, specials};

#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Insertable, Debug, Clone, PartialEq)]
#[diesel(belongs_to(Category))]
#[diesel(table_name = menu_items)]
pub struct MenuItem {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Minor currency units.
    pub price: i64,
    pub image_url: Option<String>,
    pub is_active: bool,
    /// Temporarily sold out; still listed.
    pub is_available: bool,
    pub sort_order: i32,
    pub updated_at: DateTime<Utc>,
}

impl MenuItem {
    pub fn is_orderable(&self) -> bool {
        self.is_active && self.is_available
    }
}

#[derive(Queryable, Selectable, Identifiable, Associations, Insertable, Debug, Clone, PartialEq)]
#[diesel(belongs_to(MenuItem))]
#[diesel(table_name = modifier_groups)]
pub struct ModifierGroup {
    pub id: Uuid,
    pub menu_item_id: Uuid,
    pub name: String,
    pub min_select: i32,
    pub max_select: i32,
    pub is_required: bool,
    pub sort_order: i32,
}

impl ModifierGroup {
    /// Lower bound on selections; a required group needs at least one.
    pub fn effective_min(&self) -> i32 {
        if self.is_required {
            self.min_select.max(1)
        } else {
            self.min_select
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Associations, Insertable, Debug, Clone, PartialEq)]
#[diesel(belongs_to(ModifierGroup, foreign_key = group_id))]
#[diesel(table_name = modifiers)]
pub struct Modifier {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub price_delta: i64,
    pub is_active: bool,
    pub sort_order: i32,
}

#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = specials)]
pub struct Special {
    pub id: Uuid,
    pub menu_item_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub sort_order: i32,
}

impl Special {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |starts| starts <= now)
            && self.ends_at.map_or(true, |ends| now <= ends)
    }
}

#[derive(
    Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize, Debug, Clone, PartialEq,
)]
#[diesel(table_name = settings)]
#[diesel(primary_key(key))]
pub struct SettingRow {
    pub key: String,
    pub value: serde_json::Value,
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
}
