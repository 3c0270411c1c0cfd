use axum::{extract::State, routing::get, Router};
use bistro_restaurant_service::{MenuDocument, MenuItemView};
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ok, ApiError, ApiResult};
use crate::extract::ApiPath;
use crate::models::ErrorEnvelope;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/menu", get(get_menu))
        .route("/menu/items/{id}", get(get_menu_item))
}

#[utoipa::path(
    get,
    path = "/menu",
    responses(
        (status = 200, description = "Active categories with their available items and modifiers"),
        (status = 500, description = "Catalog unavailable", body = ErrorEnvelope),
    ),
    tag = "menu"
)]
#[instrument(skip(state))]
pub async fn get_menu(State(state): State<AppState>) -> ApiResult<MenuDocument> {
    Ok(ok(state.catalog.menu(Utc::now()).await?))
}

#[utoipa::path(
    get,
    path = "/menu/items/{id}",
    params(("id" = Uuid, Path, description = "Menu item id")),
    responses(
        (status = 200, description = "Item with its modifier groups"),
        (status = 404, description = "Item not on the menu", body = ErrorEnvelope),
    ),
    tag = "menu"
)]
#[instrument(skip(state))]
pub async fn get_menu_item(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<MenuItemView> {
    let item = state
        .catalog
        .item(id, Utc::now())
        .await?
        .ok_or_else(|| ApiError::NotFound("menu item not found".to_string()))?;
    Ok(ok(item))
}
