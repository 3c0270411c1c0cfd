use std::sync::Arc;

use bistro_auth_service::Identity;
use bistro_notification_service::{Dispatcher, Notification, NotificationKind, NotificationLog};
use bistro_restaurant_service::{MenuCatalog, Settings, SettingsService};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::OrderError;
use crate::lifecycle::{authorize, stamp_for, Actor};
use crate::models::{
    NewOrderStatusChange, Order, OrderLineItem, OrderStatus, OrderStatusChange, OrderType,
    ProcessedWebhookEvent,
};
use crate::pricing::{price_lines, subtotal, CartLine, Totals};
use crate::promo::{normalize_code, PromoQuote, PromoRejection};
use crate::store::{
    InsertOrderError, NewOrder, OrderQuery, OrderStore, StatusUpdate, WebhookClaim,
};
use crate::webhook::{PaymentEvent, PaymentEventKind};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
/// How long an unfinished webhook claim blocks other deliveries of the event.
pub const WEBHOOK_CLAIM_LEASE_SECS: i64 = 120;

#[derive(Deserialize, Debug, Clone)]
pub struct Cart {
    pub order_type: OrderType,
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub table_number: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineItem>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<OrderStatus>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub next_cursor: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Accepted { order_id: Uuid },
    Cancelled { order_id: Uuid },
    AlreadyApplied { order_id: Uuid, status: OrderStatus },
    AmountMismatch { order_id: Uuid, expected: i64, received: Option<i64> },
    OrderNotFound,
    Ignored { event_type: String },
    Duplicate,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Accepted { .. } => "accepted",
            PaymentOutcome::Cancelled { .. } => "cancelled",
            PaymentOutcome::AlreadyApplied { .. } => "already_applied",
            PaymentOutcome::AmountMismatch { .. } => "amount_mismatch",
            PaymentOutcome::OrderNotFound => "order_not_found",
            PaymentOutcome::Ignored { .. } => "ignored",
            PaymentOutcome::Duplicate => "duplicate",
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            PaymentOutcome::Accepted { order_id }
            | PaymentOutcome::Cancelled { order_id }
            | PaymentOutcome::AlreadyApplied { order_id, .. }
            | PaymentOutcome::AmountMismatch { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }

    /// Whether the provider's event was reconciled with an order.
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            PaymentOutcome::AmountMismatch { .. } | PaymentOutcome::OrderNotFound
        )
    }
}

pub struct OrderService {
    pub(crate) store: Arc<dyn OrderStore>,
    pub(crate) catalog: Arc<MenuCatalog>,
    pub(crate) settings: Arc<SettingsService>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) notifications: Arc<dyn NotificationLog>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<MenuCatalog>,
        settings: Arc<SettingsService>,
        dispatcher: Arc<Dispatcher>,
        notifications: Arc<dyn NotificationLog>,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
            dispatcher,
            notifications,
        }
    }

    /// Validates `cart` against live catalog rows and settings, prices it
    /// and stores the order with its line snapshots.
    #[instrument(skip(self, identity, customer_phone, cart), fields(customer_id = %identity.user_id))]
    pub async fn place_order(
        &self,
        identity: &Identity,
        customer_phone: Option<String>,
        cart: Cart,
        now: DateTime<Utc>,
    ) -> Result<OrderDetails, OrderError> {
        let now = now.trunc_subsecs(6);
        let settings = self.settings.load().await?;
        if !settings.ordering_enabled {
            return Err(OrderError::OrderingDisabled);
        }
        if !settings.is_open_at(now) {
            return Err(OrderError::Closed);
        }

        let delivery_address = non_blank(cart.delivery_address);
        let table_number = non_blank(cart.table_number);
        match cart.order_type {
            OrderType::Pickup => {}
            OrderType::Delivery => {
                if !settings.delivery_enabled {
                    return Err(OrderError::OrderTypeUnavailable(cart.order_type));
                }
                if delivery_address.is_none() {
                    return Err(OrderError::MissingDeliveryAddress);
                }
            }
            OrderType::DineIn => {
                if !settings.dine_in_enabled {
                    return Err(OrderError::OrderTypeUnavailable(cart.order_type));
                }
                if table_number.is_none() {
                    return Err(OrderError::MissingTableNumber);
                }
            }
        }
        if cart.items.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut item_ids: Vec<Uuid> = cart.items.iter().map(|line| line.menu_item_id).collect();
        item_ids.sort();
        item_ids.dedup();
        let items = self.catalog.items_for_pricing(&item_ids).await?;
        let priced = price_lines(&cart.items, &items)?;
        let subtotal = subtotal(&priced);
        if subtotal < settings.minimum_order {
            return Err(OrderError::BelowMinimumOrder {
                minimum: settings.minimum_order,
            });
        }

        let promo_code = cart
            .promo_code
            .as_deref()
            .map(normalize_code)
            .filter(|code| !code.is_empty());
        let promo = match &promo_code {
            Some(code) => {
                let promo = self
                    .store
                    .find_promo(code)
                    .await?
                    .ok_or(PromoRejection::NotFound)?;
                promo.check(subtotal, now)?;
                Some(promo)
            }
            None => None,
        };

        let delivery_fee = match cart.order_type {
            OrderType::Delivery => settings.delivery_fee,
            _ => 0,
        };
        let totals = Totals::new(
            subtotal,
            delivery_fee,
            settings.service_fee,
            promo.as_ref().map_or(0, |promo| promo.discount_for(subtotal)),
        );
        let status = if settings.online_payment_required {
            OrderStatus::AwaitingPayment
        } else {
            OrderStatus::Created
        };

        let order_id = Uuid::new_v4();
        let actor = Actor::from_identity(identity);
        let new = NewOrder {
            order: Order {
                id: order_id,
                customer_id: identity.user_id,
                customer_phone,
                order_type: cart.order_type,
                status,
                subtotal: totals.subtotal,
                delivery_fee: totals.delivery_fee,
                service_fee: totals.service_fee,
                discount: totals.discount,
                total: totals.total,
                promo_code: promo.map(|promo| promo.code),
                payment_reference: None,
                notes: non_blank(cart.notes),
                delivery_address,
                table_number,
                cancel_reason: None,
                placed_at: now,
                accepted_at: None,
                ready_at: None,
                completed_at: None,
                cancelled_at: None,
                updated_at: now,
            },
            lines: priced
                .into_iter()
                .map(|line| OrderLineItem {
                    id: Uuid::new_v4(),
                    order_id,
                    menu_item_id: line.menu_item_id,
                    name: line.name,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    modifiers: line.modifiers,
                    line_total: line.line_total,
                })
                .collect(),
            first_change: NewOrderStatusChange {
                order_id,
                from_status: None,
                to_status: status,
                actor: actor.as_str().to_string(),
                actor_id: actor.user_id(),
                reason: None,
                changed_at: now,
            },
        };

        self.store
            .insert_order(&new)
            .await
            .map_err(|err| match err {
                InsertOrderError::PromoExhausted => PromoRejection::UsageLimitReached.into(),
                InsertOrderError::Store(err) => OrderError::Store(err),
            })?;
        info!(%order_id, total = new.order.total, status = %status, "order placed");

        self.notify_placed(&new.order, &settings).await;
        Ok(OrderDetails {
            order: new.order,
            items: new.lines,
        })
    }

    /// Loads an order the caller may see. Other customers' orders read as
    /// missing.
    async fn visible_order(&self, identity: &Identity, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .find_order(order_id)
            .await?
            .filter(|order| identity.is_staff() || order.customer_id == identity.user_id)
            .ok_or(OrderError::NotFound)
    }

    pub async fn get_order(
        &self,
        identity: &Identity,
        order_id: Uuid,
    ) -> Result<OrderDetails, OrderError> {
        let order = self.visible_order(identity, order_id).await?;
        let items = self.store.line_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    pub async fn order_history(
        &self,
        identity: &Identity,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatusChange>, OrderError> {
        self.visible_order(identity, order_id).await?;
        Ok(self.store.status_history(order_id).await?)
    }

    /// Customers page through their own orders; staff see every order.
    pub async fn list_orders(
        &self,
        identity: &Identity,
        filter: ListFilter,
    ) -> Result<OrderPage, OrderError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let before = filter.cursor.as_deref().map(decode_cursor).transpose()?;
        let query = OrderQuery {
            customer_id: (!identity.is_staff()).then_some(identity.user_id),
            status: filter.status,
            before,
            limit: limit + 1,
        };

        let mut orders = self.store.list_orders(&query).await?;
        let next_cursor = if orders.len() as i64 > limit {
            orders.truncate(limit as usize);
            orders.last().map(encode_cursor)
        } else {
            None
        };
        Ok(OrderPage {
            orders,
            next_cursor,
        })
    }

    pub async fn validate_promo(
        &self,
        code: &str,
        subtotal: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<PromoQuote, OrderError> {
        let promo = self
            .store
            .find_promo(&normalize_code(code))
            .await?
            .ok_or(PromoRejection::NotFound)?;
        match subtotal {
            Some(subtotal) => promo.check(subtotal, now)?,
            None => promo.check_usable(now)?,
        }
        Ok(PromoQuote {
            discount: subtotal.map(|subtotal| promo.discount_for(subtotal)),
            code: promo.code,
            description: promo.description,
            discount_type: promo.discount_type,
            value: promo.value,
            minimum_order: promo.minimum_order,
        })
    }

    /// Staff and customer driven status changes.
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn transition(
        &self,
        identity: &Identity,
        order_id: Uuid,
        next: OrderStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let order = self.visible_order(identity, order_id).await?;
        self.apply_transition(
            &order,
            next,
            Actor::from_identity(identity),
            non_blank(reason),
            None,
            now,
        )
        .await
    }

    pub(crate) async fn apply_transition(
        &self,
        order: &Order,
        next: OrderStatus,
        actor: Actor,
        reason: Option<String>,
        payment_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        authorize(order, next, &actor)?;

        let update = StatusUpdate {
            order_id: order.id,
            expected: order.status,
            stamp: stamp_for(next, now, reason.clone(), payment_reference),
            change: NewOrderStatusChange {
                order_id: order.id,
                from_status: Some(order.status),
                to_status: next,
                actor: actor.as_str().to_string(),
                actor_id: actor.user_id(),
                reason,
                changed_at: now,
            },
        };
        let updated = self
            .store
            .update_status(&update)
            .await?
            .ok_or(OrderError::Conflict)?;
        info!(
            order_id = %order.id,
            from = %order.status,
            to = %next,
            actor = actor.as_str(),
            "order status changed"
        );

        self.notify_status(&updated).await;
        Ok(updated)
    }

    /// Reconciles a verified payment event. The event id is claimed first,
    /// so replays are reported as `Duplicate`. A delivery that arrives while
    /// another holds the claim gets `Conflict` and is retried by the provider.
    /// The claim is released when applying fails, and a claim left behind
    /// without an outcome can be taken over once its lease has run out.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, kind = event.kind.as_str()))]
    pub async fn apply_payment_event(
        &self,
        provider: &str,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome, OrderError> {
        let claim = self
            .store
            .claim_webhook_event(
                &ProcessedWebhookEvent {
                    event_id: event.event_id.clone(),
                    provider: provider.to_string(),
                    event_type: event.kind.as_str().to_string(),
                    order_id: event.order_id,
                    outcome: None,
                    processed_at: now,
                },
                now - TimeDelta::seconds(WEBHOOK_CLAIM_LEASE_SECS),
            )
            .await?;
        match claim {
            WebhookClaim::Claimed => {}
            WebhookClaim::Processed => {
                info!("payment event already processed");
                return Ok(PaymentOutcome::Duplicate);
            }
            WebhookClaim::InFlight => {
                warn!("payment event is being processed by another delivery");
                return Err(OrderError::Conflict);
            }
        }

        match self.settle_payment(event, now).await {
            Ok(outcome) => {
                if let Err(err) = self
                    .store
                    .finish_webhook_event(&event.event_id, outcome.order_id(), outcome.as_str())
                    .await
                {
                    warn!(error = %err, "cannot record payment event outcome");
                }
                info!(outcome = outcome.as_str(), "payment event processed");
                Ok(outcome)
            }
            Err(err) => {
                if let Err(release_err) = self.store.release_webhook_event(&event.event_id).await {
                    error!(error = %release_err, "cannot release payment event");
                }
                Err(err)
            }
        }
    }

    async fn settle_payment(
        &self,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome, OrderError> {
        let succeeded = match &event.kind {
            PaymentEventKind::Succeeded => true,
            PaymentEventKind::Failed => false,
            PaymentEventKind::Other(kind) => {
                return Ok(PaymentOutcome::Ignored {
                    event_type: kind.clone(),
                })
            }
        };

        let order = match (event.order_id, event.payment_reference.as_deref()) {
            (Some(order_id), _) => self.store.find_order(order_id).await?,
            (None, Some(reference)) => self.store.find_order_by_payment_reference(reference).await?,
            (None, None) => None,
        };
        let Some(order) = order else {
            warn!(order_id = ?event.order_id, "payment event for unknown order");
            return Ok(PaymentOutcome::OrderNotFound);
        };
        let already = PaymentOutcome::AlreadyApplied {
            order_id: order.id,
            status: order.status,
        };

        if succeeded {
            if order.status == OrderStatus::Cancelled {
                warn!(order_id = %order.id, "payment succeeded for a cancelled order");
                return Ok(already);
            }
            if order.status.is_paid_or_later() {
                return Ok(already);
            }
            if event.amount != Some(order.total) {
                warn!(
                    order_id = %order.id,
                    expected = order.total,
                    received = ?event.amount,
                    "payment amount does not match order total"
                );
                return Ok(PaymentOutcome::AmountMismatch {
                    order_id: order.id,
                    expected: order.total,
                    received: event.amount,
                });
            }

            let mut current = order;
            if current.status == OrderStatus::Created {
                current = self
                    .apply_transition(
                        &current,
                        OrderStatus::AwaitingPayment,
                        Actor::PaymentProvider,
                        None,
                        None,
                        now,
                    )
                    .await?;
            }
            let accepted = self
                .apply_transition(
                    &current,
                    OrderStatus::Accepted,
                    Actor::PaymentProvider,
                    None,
                    event.payment_reference.clone(),
                    now,
                )
                .await?;
            Ok(PaymentOutcome::Accepted {
                order_id: accepted.id,
            })
        } else {
            if !matches!(
                order.status,
                OrderStatus::Created | OrderStatus::AwaitingPayment
            ) {
                return Ok(already);
            }
            let cancelled = self
                .apply_transition(
                    &order,
                    OrderStatus::Cancelled,
                    Actor::PaymentProvider,
                    Some("payment_failed".to_string()),
                    None,
                    now,
                )
                .await?;
            Ok(PaymentOutcome::Cancelled {
                order_id: cancelled.id,
            })
        }
    }

    pub(crate) async fn restaurant_settings(&self) -> Settings {
        match self.settings.current().await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "settings unavailable, using defaults for message");
                Settings::default()
            }
        }
    }

    async fn notify_placed(&self, order: &Order, settings: &Settings) {
        let mut body = format!(
            "{}: we received order {}. Total {}.",
            settings.restaurant_name,
            order.reference(),
            format_amount(order.total)
        );
        if order.status == OrderStatus::AwaitingPayment {
            body.push_str(" Complete payment to confirm it.");
        }
        self.dispatcher
            .dispatch(Notification {
                kind: NotificationKind::OrderPlaced,
                recipient: order.customer_phone.clone(),
                body,
                reference_id: Some(order.id),
            })
            .await;

        if let Some(staff_phone) = &settings.staff_alert_phone {
            self.dispatcher
                .dispatch(Notification {
                    kind: NotificationKind::OrderPlaced,
                    recipient: Some(staff_phone.clone()),
                    body: format!(
                        "New {} order {}: {}.",
                        order_type_label(order.order_type),
                        order.reference(),
                        format_amount(order.total)
                    ),
                    reference_id: Some(order.id),
                })
                .await;
        }
    }

    async fn notify_status(&self, order: &Order) {
        let Some(kind) = order.status.notification_kind() else {
            return;
        };
        let settings = self.restaurant_settings().await;
        self.dispatcher
            .dispatch(Notification {
                kind,
                recipient: order.customer_phone.clone(),
                body: status_message(order, &settings),
                reference_id: Some(order.id),
            })
            .await;
    }
}

fn status_message(order: &Order, settings: &Settings) -> String {
    let name = &settings.restaurant_name;
    let reference = order.reference();
    match order.status {
        OrderStatus::Accepted => format!(
            "{name}: order {reference} is confirmed and will be ready in about {} minutes.",
            settings.prep_time_minutes
        ),
        OrderStatus::InPrep => format!("{name}: order {reference} is being prepared."),
        OrderStatus::Ready => match order.order_type {
            OrderType::Pickup => format!("{name}: order {reference} is ready for collection."),
            OrderType::Delivery => format!("{name}: order {reference} is on its way."),
            OrderType::DineIn => format!("{name}: order {reference} is coming to your table."),
        },
        OrderStatus::Completed => format!("Thanks for ordering from {name}! Order {reference} is complete."),
        OrderStatus::Cancelled => format!(
            "{name}: order {reference} was cancelled ({}).",
            order.cancel_reason.as_deref().unwrap_or("cancelled")
        ),
        OrderStatus::Created | OrderStatus::AwaitingPayment => {
            format!("{name}: order {reference} is {}.", order.status)
        }
    }
}

fn order_type_label(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Pickup => "pickup",
        OrderType::Delivery => "delivery",
        OrderType::DineIn => "dine-in",
    }
}

/// Minor units as a decimal amount, e.g. `9900` as `99.00`.
pub fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let minor = minor.unsigned_abs();
    format!("{sign}{}.{:02}", minor / 100, minor % 100)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Keyset cursor `"{placed_at micros}:{id}"`.
pub fn encode_cursor(order: &Order) -> String {
    format!("{}:{}", order.placed_at.timestamp_micros(), order.id)
}

pub fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, Uuid), OrderError> {
    let (micros, id) = cursor.split_once(':').ok_or(OrderError::InvalidCursor)?;
    let placed_at = micros
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_micros)
        .ok_or(OrderError::InvalidCursor)?;
    let id = id.parse::<Uuid>().map_err(|_| OrderError::InvalidCursor)?;
    Ok((placed_at, id))
}
