pub mod admin;
pub mod auth;
pub mod menu;
pub mod orders;
pub mod promo;
pub mod settings;
pub mod webhooks;

pub use admin::router as admin_router;
pub use auth::router as auth_router;
pub use menu::router as menu_router;
pub use orders::router as order_router;
pub use promo::router as promo_router;
pub use settings::router as settings_router;
pub use webhooks::router as webhook_router;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    routing::get,
    Router,
};
use bistro_auth_service::Identity;
use utoipa::OpenApi;

use crate::error::{ok, ApiError, ApiResult};
use crate::models::{Envelope, HealthResponse};
use crate::state::AppState;

/// Resolves the bearer token in `Authorization` to a live identity.
pub(crate) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Unauthenticated("malformed authorization header".to_string()))
        })
        .transpose()?;
    Ok(state.authenticator.resolve_bearer(header).await?)
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is up", body = Envelope<HealthResponse>)),
    tag = "health"
)]
pub async fn health() -> ApiResult<HealthResponse> {
    Ok(ok(HealthResponse {
        status: "ok".to_string(),
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        menu::get_menu,
        menu::get_menu_item,
        settings::get_settings,
        promo::validate_promo,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::get_order_history,
        orders::cancel_order,
        auth::request_otp,
        auth::verify_otp,
        auth::logout,
        auth::me,
        webhooks::receive_webhook,
        admin::update_order_status,
        admin::update_menu_item,
        admin::update_setting,
    ),
    components(
        schemas(
            crate::models::ErrorEnvelope,
            crate::models::ErrorBody,
            crate::models::HealthResponse,
            crate::models::ValidatePromoRequest,
            crate::models::PromoQuoteResponse,
            crate::models::CreateOrderRequest,
            crate::models::CartLineRequest,
            crate::models::OrderResponse,
            crate::models::LineItemResponse,
            crate::models::LineModifierResponse,
            crate::models::OrderListResponse,
            crate::models::StatusChangeResponse,
            crate::models::CancelOrderRequest,
            crate::models::UpdateOrderStatusRequest,
            crate::models::UpdateMenuItemRequest,
            crate::models::MenuItemUpdateResponse,
            crate::models::UpdateSettingRequest,
            crate::models::OtpRequest,
            crate::models::OtpRequestedResponse,
            crate::models::OtpVerifyRequest,
            crate::models::SessionResponse,
            crate::models::UserResponse,
            crate::models::LogoutResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness"),
        (name = "menu", description = "Public menu"),
        (name = "settings", description = "Public restaurant settings"),
        (name = "promo", description = "Promo code checks"),
        (name = "orders", description = "Customer orders"),
        (name = "auth", description = "Phone login and sessions"),
        (name = "webhooks", description = "Signed payment provider callbacks"),
        (name = "admin", description = "Staff and manager operations")
    ),
    info(
        title = "Bistro API",
        description = "Ordering API for a single restaurant",
        version = "1.0.0"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            use utoipa::openapi::security::*;
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
