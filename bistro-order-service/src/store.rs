use std::collections::HashMap;

use async_trait::async_trait;
use bistro_common::{connection, DbPool, StoreError};
use chrono::{DateTime, Utc};
use diesel::{delete, insert_into, prelude::*, update};
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    NewOrderStatusChange, Order, OrderLineItem, OrderStatus, OrderStatusChange, OrderType,
    ProcessedWebhookEvent, PromoCode, StatusStamp,
};
use crate::schema;

/// Result of trying to take a webhook event id for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookClaim {
    Claimed,
    /// An earlier delivery already recorded an outcome.
    Processed,
    /// Another delivery holds a claim that has not expired.
    InFlight,
}

/// Everything written when an order is placed.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: Order,
    pub lines: Vec<OrderLineItem>,
    pub first_change: NewOrderStatusChange,
}

#[derive(Error, Debug)]
pub enum InsertOrderError {
    #[error("promo code usage limit reached")]
    PromoExhausted,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<diesel::result::Error> for InsertOrderError {
    fn from(err: diesel::result::Error) -> Self {
        InsertOrderError::Store(err.into())
    }
}

/// A status change guarded by the status it expects to replace.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub order_id: Uuid,
    pub expected: OrderStatus,
    pub stamp: StatusStamp,
    pub change: NewOrderStatusChange,
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    /// Keyset position: only orders strictly older than this.
    pub before: Option<(DateTime<Utc>, Uuid)>,
    pub limit: i64,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_order_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, StoreError>;

    async fn line_items(&self, order_id: Uuid) -> Result<Vec<OrderLineItem>, StoreError>;

    /// Newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError>;

    async fn status_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusChange>, StoreError>;

    /// Writes the order, its lines and first status change atomically,
    /// taking one promo use if the order carries a code.
    async fn insert_order(&self, new: &NewOrder) -> Result<(), InsertOrderError>;

    /// Applies the update only while the order is still in
    /// `update.expected`; `None` means another writer got there first.
    async fn update_status(&self, update: &StatusUpdate) -> Result<Option<Order>, StoreError>;

    async fn find_promo(&self, code: &str) -> Result<Option<PromoCode>, StoreError>;

    /// Takes the event id for processing. A claim without an outcome that was
    /// taken at or before `stale_before` is taken over.
    async fn claim_webhook_event(
        &self,
        event: &ProcessedWebhookEvent,
        stale_before: DateTime<Utc>,
    ) -> Result<WebhookClaim, StoreError>;

    async fn finish_webhook_event(
        &self,
        event_id: &str,
        order_id: Option<Uuid>,
        outcome: &str,
    ) -> Result<(), StoreError>;

    async fn release_webhook_event(&self, event_id: &str) -> Result<(), StoreError>;

    /// Pickup orders in `READY` since at or before `cutoff`.
    async fn ready_pickups_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;
}

pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(schema::orders::table
            .select(Order::as_select())
            .find(id)
            .first(conn)
            .await
            .optional()?)
    }

    async fn find_order_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(schema::orders::table
            .select(Order::as_select())
            .filter(schema::orders::payment_reference.eq(reference))
            .first(conn)
            .await
            .optional()?)
    }

    async fn line_items(&self, order_id: Uuid) -> Result<Vec<OrderLineItem>, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(schema::order_line_items::table
            .select(OrderLineItem::as_select())
            .filter(schema::order_line_items::order_id.eq(order_id))
            .load(conn)
            .await?)
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        use schema::orders::dsl;

        let conn = &mut connection(&self.pool).await?;
        let mut statement = dsl::orders.select(Order::as_select()).into_boxed();
        if let Some(customer_id) = query.customer_id {
            statement = statement.filter(dsl::customer_id.eq(customer_id));
        }
        if let Some(status) = query.status {
            statement = statement.filter(dsl::status.eq(status));
        }
        if let Some((placed_at, id)) = query.before {
            statement = statement.filter(
                dsl::placed_at
                    .lt(placed_at)
                    .or(dsl::placed_at.eq(placed_at).and(dsl::id.lt(id))),
            );
        }
        Ok(statement
            .order((dsl::placed_at.desc(), dsl::id.desc()))
            .limit(query.limit)
            .load(conn)
            .await?)
    }

    async fn status_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusChange>, StoreError> {
        use schema::order_status_changes::dsl;

        let conn = &mut connection(&self.pool).await?;
        Ok(dsl::order_status_changes
            .select(OrderStatusChange::as_select())
            .filter(dsl::order_id.eq(order_id))
            .order(dsl::id.asc())
            .load(conn)
            .await?)
    }

    async fn insert_order(&self, new: &NewOrder) -> Result<(), InsertOrderError> {
        let conn = &mut connection(&self.pool).await?;
        conn.transaction::<_, InsertOrderError, _>(|conn| {
            async move {
                if let Some(code) = &new.order.promo_code {
                    use schema::promo_codes::dsl;

                    let taken = update(
                        dsl::promo_codes.find(code).filter(
                            dsl::usage_limit
                                .is_null()
                                .or(dsl::usage_count.nullable().lt(dsl::usage_limit)),
                        ),
                    )
                    .set(dsl::usage_count.eq(dsl::usage_count + 1))
                    .execute(conn)
                    .await?;
                    if taken == 0 {
                        return Err(InsertOrderError::PromoExhausted);
                    }
                }
                insert_into(schema::orders::table)
                    .values(&new.order)
                    .execute(conn)
                    .await?;
                insert_into(schema::order_line_items::table)
                    .values(&new.lines)
                    .execute(conn)
                    .await?;
                insert_into(schema::order_status_changes::table)
                    .values(&new.first_change)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn update_status(&self, status: &StatusUpdate) -> Result<Option<Order>, StoreError> {
        use schema::orders::dsl;

        let conn = &mut connection(&self.pool).await?;
        let updated = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let updated = update(
                        dsl::orders
                            .find(status.order_id)
                            .filter(dsl::status.eq(status.expected)),
                    )
                    .set(&status.stamp)
                    .returning(Order::as_returning())
                    .get_result(conn)
                    .await
                    .optional()?;
                    if updated.is_some() {
                        insert_into(schema::order_status_changes::table)
                            .values(&status.change)
                            .execute(conn)
                            .await?;
                    }
                    Ok(updated)
                }
                .scope_boxed()
            })
            .await?;
        Ok(updated)
    }

    async fn find_promo(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(schema::promo_codes::table
            .select(PromoCode::as_select())
            .find(code)
            .first(conn)
            .await
            .optional()?)
    }

    async fn claim_webhook_event(
        &self,
        event: &ProcessedWebhookEvent,
        stale_before: DateTime<Utc>,
    ) -> Result<WebhookClaim, StoreError> {
        use schema::processed_webhook_events::dsl;

        let conn = &mut connection(&self.pool).await?;
        let inserted = insert_into(dsl::processed_webhook_events)
            .values(event)
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;
        if inserted == 1 {
            return Ok(WebhookClaim::Claimed);
        }

        let taken_over = update(
            dsl::processed_webhook_events
                .find(event.event_id.as_str())
                .filter(dsl::outcome.is_null())
                .filter(dsl::processed_at.le(stale_before)),
        )
        .set((
            dsl::provider.eq(&event.provider),
            dsl::event_type.eq(&event.event_type),
            dsl::processed_at.eq(event.processed_at),
        ))
        .execute(conn)
        .await?;
        if taken_over == 1 {
            return Ok(WebhookClaim::Claimed);
        }

        let outcome = dsl::processed_webhook_events
            .find(event.event_id.as_str())
            .select(dsl::outcome)
            .first::<Option<String>>(conn)
            .await
            .optional()?;
        Ok(match outcome {
            Some(Some(_)) => WebhookClaim::Processed,
            _ => WebhookClaim::InFlight,
        })
    }

    async fn finish_webhook_event(
        &self,
        event_id: &str,
        order_id: Option<Uuid>,
        outcome: &str,
    ) -> Result<(), StoreError> {
        use schema::processed_webhook_events::dsl;

        let conn = &mut connection(&self.pool).await?;
        update(dsl::processed_webhook_events.find(event_id))
            .set((dsl::order_id.eq(order_id), dsl::outcome.eq(Some(outcome))))
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn release_webhook_event(&self, event_id: &str) -> Result<(), StoreError> {
        let conn = &mut connection(&self.pool).await?;
        delete(schema::processed_webhook_events::table.find(event_id))
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn ready_pickups_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        use schema::orders::dsl;

        let conn = &mut connection(&self.pool).await?;
        Ok(dsl::orders
            .select(Order::as_select())
            .filter(dsl::status.eq(OrderStatus::Ready))
            .filter(dsl::order_type.eq(OrderType::Pickup))
            .filter(dsl::ready_at.le(cutoff))
            .order(dsl::ready_at.asc())
            .load(conn)
            .await?)
    }
}

#[derive(Default)]
struct MemoryOrders {
    orders: HashMap<Uuid, Order>,
    lines: Vec<OrderLineItem>,
    changes: Vec<OrderStatusChange>,
    promos: HashMap<String, PromoCode>,
    webhook_events: HashMap<String, ProcessedWebhookEvent>,
}

impl MemoryOrders {
    fn push_change(&mut self, change: &NewOrderStatusChange) {
        let id = self.changes.len() as i64 + 1;
        self.changes.push(OrderStatusChange {
            id,
            order_id: change.order_id,
            from_status: change.from_status,
            to_status: change.to_status,
            actor: change.actor.clone(),
            actor_id: change.actor_id,
            reason: change.reason.clone(),
            changed_at: change.changed_at,
        });
    }
}

/// In-process store for tests and local runs.
#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Mutex<MemoryOrders>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_promo(&self, promo: PromoCode) {
        self.inner
            .lock()
            .await
            .promos
            .insert(promo.code.clone(), promo);
    }

    /// Overwrites an order row, bypassing the state graph.
    pub async fn put_order(&self, order: Order) {
        self.inner.lock().await.orders.insert(order.id, order);
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn find_order_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .values()
            .find(|order| order.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn line_items(&self, order_id: Uuid) -> Result<Vec<OrderLineItem>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .lines
            .iter()
            .filter(|line| line.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| query.customer_id.map_or(true, |id| order.customer_id == id))
            .filter(|order| query.status.map_or(true, |status| order.status == status))
            .filter(|order| {
                query
                    .before
                    .map_or(true, |position| (order.placed_at, order.id) < position)
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.placed_at, b.id).cmp(&(a.placed_at, a.id)));
        orders.truncate(query.limit.max(0) as usize);
        Ok(orders)
    }

    async fn status_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusChange>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .changes
            .iter()
            .filter(|change| change.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn insert_order(&self, new: &NewOrder) -> Result<(), InsertOrderError> {
        let mut inner = self.inner.lock().await;
        if let Some(code) = &new.order.promo_code {
            let promo = inner
                .promos
                .get_mut(code)
                .ok_or(InsertOrderError::PromoExhausted)?;
            if promo
                .usage_limit
                .is_some_and(|limit| promo.usage_count >= limit)
            {
                return Err(InsertOrderError::PromoExhausted);
            }
            promo.usage_count += 1;
        }
        inner.orders.insert(new.order.id, new.order.clone());
        inner.lines.extend(new.lines.iter().cloned());
        inner.push_change(&new.first_change);
        Ok(())
    }

    async fn update_status(&self, status: &StatusUpdate) -> Result<Option<Order>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(order) = inner
            .orders
            .get_mut(&status.order_id)
            .filter(|order| order.status == status.expected)
        else {
            return Ok(None);
        };

        let stamp = &status.stamp;
        order.status = stamp.status;
        order.updated_at = stamp.updated_at;
        order.accepted_at = stamp.accepted_at.or(order.accepted_at);
        order.ready_at = stamp.ready_at.or(order.ready_at);
        order.completed_at = stamp.completed_at.or(order.completed_at);
        order.cancelled_at = stamp.cancelled_at.or(order.cancelled_at);
        if stamp.cancel_reason.is_some() {
            order.cancel_reason = stamp.cancel_reason.clone();
        }
        if stamp.payment_reference.is_some() {
            order.payment_reference = stamp.payment_reference.clone();
        }
        let updated = order.clone();
        inner.push_change(&status.change);
        Ok(Some(updated))
    }

    async fn find_promo(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        Ok(self.inner.lock().await.promos.get(code).cloned())
    }

    async fn claim_webhook_event(
        &self,
        event: &ProcessedWebhookEvent,
        stale_before: DateTime<Utc>,
    ) -> Result<WebhookClaim, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.webhook_events.get(&event.event_id) {
            Some(existing) if existing.outcome.is_some() => return Ok(WebhookClaim::Processed),
            Some(existing) if existing.processed_at > stale_before => {
                return Ok(WebhookClaim::InFlight)
            }
            _ => {}
        }
        inner
            .webhook_events
            .insert(event.event_id.clone(), event.clone());
        Ok(WebhookClaim::Claimed)
    }

    async fn finish_webhook_event(
        &self,
        event_id: &str,
        order_id: Option<Uuid>,
        outcome: &str,
    ) -> Result<(), StoreError> {
        if let Some(event) = self.inner.lock().await.webhook_events.get_mut(event_id) {
            event.order_id = order_id;
            event.outcome = Some(outcome.to_string());
        }
        Ok(())
    }

    async fn release_webhook_event(&self, event_id: &str) -> Result<(), StoreError> {
        self.inner.lock().await.webhook_events.remove(event_id);
        Ok(())
    }

    async fn ready_pickups_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .inner
            .lock()
            .await
            .orders
            .values()
            .filter(|order| {
                order.status == OrderStatus::Ready
                    && order.order_type == OrderType::Pickup
                    && order.ready_at.is_some_and(|ready_at| ready_at <= cutoff)
            })
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.ready_at);
        Ok(orders)
    }
}
