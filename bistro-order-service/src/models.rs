use std::io::Write;

use chrono::{DateTime, Utc};
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Jsonb,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    order_line_items, order_status_changes, orders, processed_webhook_events, promo_codes,
};

#[derive(
    FromSqlRow, AsExpression, Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone, Debug,
)]
#[diesel(sql_type = crate::schema::sql_types::OrderStatus)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    AwaitingPayment,
    Accepted,
    InPrep,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::InPrep => "IN_PREP",
            OrderStatus::Ready => "READY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATED" => Ok(OrderStatus::Created),
            "AWAITING_PAYMENT" => Ok(OrderStatus::AwaitingPayment),
            "ACCEPTED" => Ok(OrderStatus::Accepted),
            "IN_PREP" => Ok(OrderStatus::InPrep),
            "READY" => Ok(OrderStatus::Ready),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("Unknown order status `{other}`")),
        }
    }
}

impl ToSql<crate::schema::sql_types::OrderStatus, Pg> for OrderStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::OrderStatus, Pg> for OrderStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"CREATED" => Ok(OrderStatus::Created),
            b"AWAITING_PAYMENT" => Ok(OrderStatus::AwaitingPayment),
            b"ACCEPTED" => Ok(OrderStatus::Accepted),
            b"IN_PREP" => Ok(OrderStatus::InPrep),
            b"READY" => Ok(OrderStatus::Ready),
            b"COMPLETED" => Ok(OrderStatus::Completed),
            b"CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

#[derive(
    FromSqlRow, AsExpression, Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone, Debug,
)]
#[diesel(sql_type = crate::schema::sql_types::OrderType)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Pickup,
    Delivery,
    DineIn,
}

impl ToSql<crate::schema::sql_types::OrderType, Pg> for OrderType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            OrderType::Pickup => out.write_all(b"PICKUP")?,
            OrderType::Delivery => out.write_all(b"DELIVERY")?,
            OrderType::DineIn => out.write_all(b"DINE_IN")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::OrderType, Pg> for OrderType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"PICKUP" => Ok(OrderType::Pickup),
            b"DELIVERY" => Ok(OrderType::Delivery),
            b"DINE_IN" => Ok(OrderType::DineIn),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

#[derive(
    FromSqlRow, AsExpression, Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone, Debug,
)]
#[diesel(sql_type = crate::schema::sql_types::DiscountType)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl ToSql<crate::schema::sql_types::DiscountType, Pg> for DiscountType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            DiscountType::Percentage => out.write_all(b"PERCENTAGE")?,
            DiscountType::Fixed => out.write_all(b"FIXED")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::DiscountType, Pg> for DiscountType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"PERCENTAGE" => Ok(DiscountType::Percentage),
            b"FIXED" => Ok(DiscountType::Fixed),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = orders)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_phone: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub service_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub promo_code: Option<String>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub delivery_address: Option<String>,
    pub table_number: Option<String>,
    pub cancel_reason: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Short human reference used in messages.
    pub fn reference(&self) -> String {
        self.id.simple().to_string()[..8].to_ascii_uppercase()
    }
}

/// Modifier as chosen at checkout, priced at that moment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LineModifier {
    pub modifier_id: Uuid,
    pub group: String,
    pub name: String,
    pub price_delta: i64,
}

#[derive(FromSqlRow, AsExpression, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[diesel(sql_type = Jsonb)]
#[serde(transparent)]
pub struct LineModifiers(pub Vec<LineModifier>);

impl ToSql<Jsonb, Pg> for LineModifiers {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        // JSONB binary format version.
        out.write_all(&[1])?;
        serde_json::to_writer(out, &self.0)?;
        Ok(IsNull::No)
    }
}

impl FromSql<Jsonb, Pg> for LineModifiers {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes().split_first() {
            Some((1, json)) => Ok(LineModifiers(serde_json::from_slice(json)?)),
            _ => Err("Unsupported JSONB encoding version".into()),
        }
    }
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Insertable, Serialize, Debug, Clone, PartialEq,
)]
#[diesel(belongs_to(Order))]
#[diesel(table_name = order_line_items)]
pub struct OrderLineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    /// Item price before modifiers.
    pub unit_price: i64,
    pub modifiers: LineModifiers,
    pub line_total: i64,
}

#[derive(Queryable, Selectable, Identifiable, Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = promo_codes)]
#[diesel(primary_key(code))]
pub struct PromoCode {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: i64,
    pub minimum_order: i64,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = order_status_changes)]
pub struct OrderStatusChange {
    pub id: i64,
    pub order_id: Uuid,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor: String,
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = order_status_changes)]
pub struct NewOrderStatusChange {
    pub order_id: Uuid,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor: String,
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Columns written by a status transition. `None` fields are left as is.
#[derive(AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = orders)]
pub struct StatusStamp {
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub payment_reference: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = processed_webhook_events)]
#[diesel(primary_key(event_id))]
pub struct ProcessedWebhookEvent {
    pub event_id: String,
    pub provider: String,
    pub event_type: String,
    pub order_id: Option<Uuid>,
    pub outcome: Option<String>,
    pub processed_at: DateTime<Utc>,
}
