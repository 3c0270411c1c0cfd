use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub mod error;
pub mod lifecycle;
pub mod models;
pub mod pricing;
pub mod promo;
pub mod reminders;
pub mod schema;
pub mod service;
pub mod store;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use error::OrderError;
pub use lifecycle::Actor;
pub use models::{
    DiscountType, LineModifier, Order, OrderLineItem, OrderStatus, OrderStatusChange, OrderType,
    PromoCode,
};
pub use pricing::CartLine;
pub use promo::{PromoQuote, PromoRejection};
pub use reminders::{ReminderPolicy, SweepSummary};
pub use service::{Cart, ListFilter, OrderDetails, OrderPage, OrderService, PaymentOutcome};
pub use store::{MemoryOrderStore, OrderStore, PgOrderStore, WebhookClaim};
pub use webhook::{PaymentEvent, PaymentEventKind, WebhookError, WebhookHeaders, WebhookVerifier};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
