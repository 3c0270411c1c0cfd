use axum::{extract::State, routing::get, Router};
use bistro_restaurant_service::PublicSettings;
use chrono::Utc;
use tracing::instrument;

use crate::error::{ok, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings))
}

#[utoipa::path(
    get,
    path = "/settings",
    responses(
        (status = 200, description = "Public restaurant settings and whether orders are accepted right now"),
    ),
    tag = "settings"
)]
#[instrument(skip(state))]
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<PublicSettings> {
    Ok(ok(state.settings.public_view(Utc::now()).await?))
}
