use bistro_auth_service::{IssuedToken, User};
use bistro_order_service::{
    LineModifier, Order, OrderDetails, OrderLineItem, OrderPage, OrderStatusChange, PromoQuote,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Every successful response: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    /// Always false
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `promo_expired`
    pub code: String,
    /// Human readable message
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidatePromoRequest {
    /// Promo code, matched case-insensitively
    pub code: String,
    /// Cart subtotal in minor units; enables the minimum check and discount preview
    pub subtotal: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PromoQuoteResponse {
    pub code: String,
    pub description: Option<String>,
    /// `percentage` or `fixed`
    pub discount_type: String,
    pub value: i64,
    pub minimum_order: i64,
    /// Discount for the given subtotal
    pub discount: Option<i64>,
}

impl From<PromoQuote> for PromoQuoteResponse {
    fn from(quote: PromoQuote) -> Self {
        Self {
            discount_type: serde_json::to_value(quote.discount_type)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default(),
            code: quote.code,
            description: quote.description,
            value: quote.value,
            minimum_order: quote.minimum_order,
            discount: quote.discount,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartLineRequest {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub modifier_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// `pickup`, `delivery` or `dine_in`
    pub order_type: String,
    pub items: Vec<CartLineRequest>,
    pub promo_code: Option<String>,
    pub notes: Option<String>,
    /// Required for delivery orders
    pub delivery_address: Option<String>,
    /// Required for dine-in orders
    pub table_number: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineModifierResponse {
    pub modifier_id: Uuid,
    pub group: String,
    pub name: String,
    pub price_delta: i64,
}

impl From<LineModifier> for LineModifierResponse {
    fn from(modifier: LineModifier) -> Self {
        Self {
            modifier_id: modifier.modifier_id,
            group: modifier.group,
            name: modifier.name,
            price_delta: modifier.price_delta,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineItemResponse {
    pub menu_item_id: Uuid,
    /// Item name when ordered
    pub name: String,
    pub quantity: i32,
    /// Item price when ordered, before modifiers
    pub unit_price: i64,
    pub modifiers: Vec<LineModifierResponse>,
    pub line_total: i64,
}

impl From<OrderLineItem> for LineItemResponse {
    fn from(line: OrderLineItem) -> Self {
        Self {
            menu_item_id: line.menu_item_id,
            name: line.name,
            quantity: line.quantity,
            unit_price: line.unit_price,
            modifiers: line.modifiers.0.into_iter().map(Into::into).collect(),
            line_total: line.line_total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    /// Short reference shown to customers
    pub reference: String,
    pub customer_id: Uuid,
    pub status: String,
    pub order_type: String,
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
    /// Present on single-order responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItemResponse>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            reference: order.reference(),
            id: order.id,
            customer_id: order.customer_id,
            status: order.status.to_string(),
            order_type: order_type_name(&order),
            subtotal: order.subtotal,
            delivery_fee: order.delivery_fee,
            service_fee: order.service_fee,
            discount: order.discount,
            total: order.total,
            promo_code: order.promo_code,
            payment_reference: order.payment_reference,
            notes: order.notes,
            delivery_address: order.delivery_address,
            table_number: order.table_number,
            cancel_reason: order.cancel_reason,
            placed_at: order.placed_at,
            accepted_at: order.accepted_at,
            ready_at: order.ready_at,
            completed_at: order.completed_at,
            cancelled_at: order.cancelled_at,
            items: None,
        }
    }
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            items: Some(details.items.into_iter().map(Into::into).collect()),
            ..details.order.into()
        }
    }
}

fn order_type_name(order: &Order) -> String {
    serde_json::to_value(order.order_type)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    /// Pass as `cursor` to fetch the next page
    pub next_cursor: Option<String>,
}

impl From<OrderPage> for OrderListResponse {
    fn from(page: OrderPage) -> Self {
        Self {
            orders: page.orders.into_iter().map(Into::into).collect(),
            next_cursor: page.next_cursor,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusChangeResponse {
    pub from_status: Option<String>,
    pub to_status: String,
    /// `customer`, `staff` or `payment_provider`
    pub actor: String,
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl From<OrderStatusChange> for StatusChangeResponse {
    fn from(change: OrderStatusChange) -> Self {
        Self {
            from_status: change.from_status.map(|status| status.to_string()),
            to_status: change.to_status.to_string(),
            actor: change.actor,
            actor_id: change.actor_id,
            reason: change.reason,
            changed_at: change.changed_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, Default)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Target status, e.g. `IN_PREP`
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMenuItemRequest {
    pub is_available: Option<bool>,
    /// New price in minor units
    pub price: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MenuItemUpdateResponse {
    pub id: Uuid,
    pub is_available: Option<bool>,
    pub price: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingRequest {
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpRequest {
    pub phone: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OtpRequestedResponse {
    /// Normalised phone number the code was sent to
    pub phone: String,
    /// Seconds until the code expires
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpVerifyRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: serde_json::to_value(user.role)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default(),
            id: user.id,
            phone: user.phone,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token_type: String,
    pub access_token: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub is_new_user: bool,
    pub user: UserResponse,
}

impl SessionResponse {
    pub fn new(token: IssuedToken, user: User, is_new_user: bool) -> Self {
        Self {
            token_type: token.token_type,
            access_token: token.access_token,
            expires_in: token.expires_in,
            is_new_user,
            user: user.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub revoked: bool,
}
