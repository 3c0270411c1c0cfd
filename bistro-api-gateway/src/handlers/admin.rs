use axum::{
    extract::State,
    http::HeaderMap,
    routing::{patch, post, put},
    Router,
};
use bistro_auth_service::{require_role, Role};
use bistro_restaurant_service::Settings;
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ok, ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::models::{
    Envelope, ErrorEnvelope, MenuItemUpdateResponse, OrderResponse, UpdateMenuItemRequest,
    UpdateOrderStatusRequest, UpdateSettingRequest,
};
use crate::state::AppState;

use super::{authenticate, orders::parse_status};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/orders/{id}/status", post(update_order_status))
        .route("/admin/menu/items/{id}", patch(update_menu_item))
        .route("/admin/settings/{key}", put(update_setting))
}

#[utoipa::path(
    post,
    path = "/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Envelope<OrderResponse>),
        (status = 403, description = "Not staff, or the move needs payment first", body = ErrorEnvelope),
        (status = 409, description = "Move not allowed from the current status", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(state, headers))]
pub async fn update_order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, Role::Staff)?;
    let next = parse_status(&payload.status)?;

    let order = state
        .orders
        .transition(&identity, id, next, payload.reason, Utc::now())
        .await?;
    Ok(ok(order.into()))
}

#[utoipa::path(
    patch,
    path = "/admin/menu/items/{id}",
    params(("id" = Uuid, Path, description = "Menu item id")),
    request_body = UpdateMenuItemRequest,
    responses(
        (status = 200, description = "Item updated, menu cache dropped", body = Envelope<MenuItemUpdateResponse>),
        (status = 400, description = "Nothing to change or negative price", body = ErrorEnvelope),
        (status = 404, description = "No such item", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(state, headers))]
pub async fn update_menu_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateMenuItemRequest>,
) -> ApiResult<MenuItemUpdateResponse> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, Role::Staff)?;
    if payload.is_available.is_none() && payload.price.is_none() {
        return Err(ApiError::validation(
            "empty_update",
            "set `is_available` or `price`",
        ));
    }

    let now = Utc::now();
    if let Some(is_available) = payload.is_available {
        state
            .catalog
            .set_item_availability(id, is_available, now)
            .await?;
    }
    if let Some(price) = payload.price {
        state.catalog.update_item_price(id, price, now).await?;
    }
    Ok(ok(MenuItemUpdateResponse {
        id,
        is_available: payload.is_available,
        price: payload.price,
    }))
}

#[utoipa::path(
    put,
    path = "/admin/settings/{key}",
    params(("key" = String, Path, description = "Setting key, e.g. `minimum_order`")),
    request_body = UpdateSettingRequest,
    responses(
        (status = 200, description = "All settings after the change"),
        (status = 400, description = "Value does not fit the key", body = ErrorEnvelope),
        (status = 403, description = "Managers only", body = ErrorEnvelope),
        (status = 404, description = "Unknown key", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip(state, headers))]
pub async fn update_setting(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(key): ApiPath<String>,
    ApiJson(payload): ApiJson<UpdateSettingRequest>,
) -> ApiResult<Settings> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, Role::Manager)?;

    let settings = state
        .settings
        .update(&key, payload.value, Utc::now())
        .await?;
    info!(%key, user_id = %identity.user_id, "setting updated");
    Ok(ok(settings))
}
