use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod state;

pub use config::{Config, ConfigError};
pub use state::{AppState, Stores};

use handlers::{
    admin_router, auth_router, health_router, menu_router, order_router, promo_router,
    settings_router, webhook_router, ApiDoc,
};

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health_router())
        .merge(menu_router())
        .merge(settings_router())
        .merge(promo_router())
        .merge(order_router())
        .merge(auth_router())
        .merge(webhook_router())
        .merge(admin_router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::expose_dependency_errors,
        ))
        .with_state(state)
        .layer(CorsLayer::permissive())
}
