use bistro_common::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{OrderStatus, OrderType};
use crate::promo::PromoRejection;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("online ordering is currently disabled")]
    OrderingDisabled,
    #[error("the restaurant is closed")]
    Closed,
    #[error("{0:?} orders are not available")]
    OrderTypeUnavailable(OrderType),
    #[error("delivery orders need a delivery address")]
    MissingDeliveryAddress,
    #[error("dine-in orders need a table number")]
    MissingTableNumber,
    #[error("cart is empty")]
    EmptyCart,
    #[error("quantity for item {0} must be between 1 and 50")]
    InvalidQuantity(Uuid),
    #[error("menu item {0} does not exist")]
    UnknownItem(Uuid),
    #[error("menu item {0} is not available")]
    ItemUnavailable(Uuid),
    #[error("modifier {0} is not offered for this item")]
    UnknownModifier(Uuid),
    #[error("`{group}` needs between {min} and {max} selections")]
    ModifierSelection { group: String, min: i32, max: i32 },
    #[error("minimum order is {minimum}")]
    BelowMinimumOrder { minimum: i64 },
    #[error(transparent)]
    Promo(#[from] PromoRejection),
    #[error("order not found")]
    NotFound,
    #[error("not allowed to change this order")]
    Forbidden,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("order was changed concurrently")]
    Conflict,
    #[error("invalid cursor")]
    InvalidCursor,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::OrderingDisabled => "ordering_disabled",
            OrderError::Closed => "restaurant_closed",
            OrderError::OrderTypeUnavailable(_) => "order_type_unavailable",
            OrderError::MissingDeliveryAddress => "delivery_address_required",
            OrderError::MissingTableNumber => "table_number_required",
            OrderError::EmptyCart => "empty_cart",
            OrderError::InvalidQuantity(_) => "invalid_quantity",
            OrderError::UnknownItem(_) => "unknown_item",
            OrderError::ItemUnavailable(_) => "item_unavailable",
            OrderError::UnknownModifier(_) => "unknown_modifier",
            OrderError::ModifierSelection { .. } => "modifier_selection",
            OrderError::BelowMinimumOrder { .. } => "below_minimum_order",
            OrderError::Promo(rejection) => rejection.code(),
            OrderError::NotFound => "not_found",
            OrderError::Forbidden => "forbidden",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::Conflict => "conflict",
            OrderError::InvalidCursor => "invalid_cursor",
            OrderError::Store(_) => "dependency_error",
        }
    }
}
