use axum::{extract::State, routing::post, Router};
use chrono::Utc;
use tracing::instrument;

use crate::error::{ok, ApiResult};
use crate::extract::ApiJson;
use crate::models::{Envelope, ErrorEnvelope, PromoQuoteResponse, ValidatePromoRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/promo/validate", post(validate_promo))
}

#[utoipa::path(
    post,
    path = "/promo/validate",
    request_body = ValidatePromoRequest,
    responses(
        (status = 200, description = "Code is usable", body = Envelope<PromoQuoteResponse>),
        (status = 400, description = "Code unknown, expired, exhausted or below its minimum", body = ErrorEnvelope),
    ),
    tag = "promo"
)]
#[instrument(skip(state))]
pub async fn validate_promo(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ValidatePromoRequest>,
) -> ApiResult<PromoQuoteResponse> {
    let quote = state
        .orders
        .validate_promo(&payload.code, payload.subtotal, Utc::now())
        .await?;
    Ok(ok(quote.into()))
}
