use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use bistro_order_service::{Cart, CartLine, ListFilter, OrderStatus, OrderType};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::{ok, ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::{
    CancelOrderRequest, CreateOrderRequest, Envelope, ErrorEnvelope, OrderListResponse,
    OrderResponse, StatusChangeResponse,
};
use crate::state::AppState;

use super::authenticate;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    /// Only orders in this status, e.g. `READY`
    pub status: Option<String>,
    /// `next_cursor` from the previous page
    pub cursor: Option<String>,
    /// Page size, 1 to 100
    pub limit: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/history", get(get_order_history))
        .route("/orders/{id}/cancel", post(cancel_order))
}

pub(crate) fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse()
        .map_err(|reason: String| ApiError::validation("invalid_status", reason))
}

fn parse_order_type(raw: &str) -> Result<OrderType, ApiError> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase())).map_err(
        |_| ApiError::validation("invalid_order_type", format!("unknown order type `{raw}`")),
    )
}

#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order placed", body = Envelope<OrderResponse>),
        (status = 400, description = "Cart rejected", body = ErrorEnvelope),
        (status = 401, description = "Unauthenticated", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
#[instrument(skip(state, headers))]
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<CreateOrderRequest>,
) -> ApiResult<OrderResponse> {
    let identity = authenticate(&state, &headers).await?;
    let customer = state.authenticator.current_user(&identity).await?;

    let cart = Cart {
        order_type: parse_order_type(&payload.order_type)?,
        items: payload
            .items
            .into_iter()
            .map(|line| CartLine {
                menu_item_id: line.menu_item_id,
                quantity: line.quantity,
                modifier_ids: line.modifier_ids,
            })
            .collect(),
        promo_code: payload.promo_code,
        notes: payload.notes,
        delivery_address: payload.delivery_address,
        table_number: payload.table_number,
    };

    let details = state
        .orders
        .place_order(&identity, customer.phone, cart, Utc::now())
        .await?;
    Ok(ok(details.into()))
}

#[utoipa::path(
    get,
    path = "/orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Newest orders first", body = Envelope<OrderListResponse>),
        (status = 401, description = "Unauthenticated", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
#[instrument(skip(state, headers))]
pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<ListOrdersQuery>,
) -> ApiResult<OrderListResponse> {
    let identity = authenticate(&state, &headers).await?;
    let filter = ListFilter {
        status: query.status.as_deref().map(parse_status).transpose()?,
        cursor: query.cursor,
        limit: query.limit,
    };
    let page = state.orders.list_orders(&identity, filter).await?;
    Ok(ok(page.into()))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items", body = Envelope<OrderResponse>),
        (status = 404, description = "No such order for this caller", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
#[instrument(skip(state, headers))]
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<OrderResponse> {
    let identity = authenticate(&state, &headers).await?;
    Ok(ok(state.orders.get_order(&identity, id).await?.into()))
}

#[utoipa::path(
    get,
    path = "/orders/{id}/history",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Status changes, oldest first", body = Envelope<Vec<StatusChangeResponse>>),
        (status = 404, description = "No such order for this caller", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
#[instrument(skip(state, headers))]
pub async fn get_order_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<StatusChangeResponse>> {
    let identity = authenticate(&state, &headers).await?;
    let history = state.orders.order_history(&identity, id).await?;
    Ok(ok(history.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = CancelOrderRequest, description = "Optional, may be empty"),
    responses(
        (status = 200, description = "Order cancelled", body = Envelope<OrderResponse>),
        (status = 403, description = "Order can no longer be cancelled by the customer", body = ErrorEnvelope),
        (status = 409, description = "Order changed concurrently or is already final", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
#[instrument(skip(state, headers, body))]
pub async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult<OrderResponse> {
    let identity = authenticate(&state, &headers).await?;
    let request: CancelOrderRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CancelOrderRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::validation("invalid_body", err.to_string()))?
    };

    let order = state
        .orders
        .transition(&identity, id, OrderStatus::Cancelled, request.reason, Utc::now())
        .await?;
    Ok(ok(order.into()))
}
