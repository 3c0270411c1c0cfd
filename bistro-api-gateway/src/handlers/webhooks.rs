use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use bistro_order_service::{PaymentEvent, PaymentOutcome, WebhookHeaders};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::{ok, ApiError};
use crate::extract::ApiPath;
use crate::models::ErrorEnvelope;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/{provider}", post(receive_webhook))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn apply(
    state: &AppState,
    provider: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<PaymentOutcome, ApiError> {
    let now = Utc::now();
    let headers = WebhookHeaders {
        id: header(headers, "webhook-id"),
        timestamp: header(headers, "webhook-timestamp"),
        signature: header(headers, "webhook-signature"),
    };
    let verified = state.webhooks.verify(body, &headers, now)?;
    let event = PaymentEvent::parse(&verified, body)?;
    Ok(state
        .orders
        .apply_payment_event(provider, &event, now)
        .await?)
}

fn outcome_message(outcome: &PaymentOutcome) -> String {
    match outcome {
        PaymentOutcome::AmountMismatch {
            expected, received, ..
        } => match received {
            Some(received) => format!("paid amount {received} does not match order total {expected}"),
            None => format!("event carries no amount, order total is {expected}"),
        },
        PaymentOutcome::OrderNotFound => "no order matches this payment".to_string(),
        other => other.as_str().to_string(),
    }
}

/// Signature problems keep their 4xx status and dependency failures answer
/// 500 so the provider retries. Everything else is final and answers 200.
#[utoipa::path(
    post,
    path = "/webhooks/{provider}",
    params(
        ("provider" = String, Path, description = "Payment provider name"),
        ("webhook-id" = String, Header, description = "Unique message id"),
        ("webhook-timestamp" = i64, Header, description = "Unix seconds when the message was signed"),
        ("webhook-signature" = String, Header, description = "Space separated `v1,<base64>` signatures"),
    ),
    request_body(content = String, description = "Raw provider event", content_type = "application/json"),
    responses(
        (status = 200, description = "Processed; `success` is false for rejected events"),
        (status = 400, description = "Missing webhook header", body = ErrorEnvelope),
        (status = 403, description = "Signature or timestamp rejected", body = ErrorEnvelope),
        (status = 409, description = "Order changed concurrently, retry", body = ErrorEnvelope),
        (status = 500, description = "Dependency failure, retry", body = ErrorEnvelope),
    ),
    tag = "webhooks"
)]
#[instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn receive_webhook(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match apply(&state, &provider, &headers, &body).await {
        Ok(outcome) if outcome.is_success() => {
            info!(outcome = outcome.as_str(), "webhook processed");
            ok(outcome).into_response()
        }
        Ok(outcome) => {
            warn!(outcome = outcome.as_str(), "webhook event rejected");
            (
                StatusCode::OK,
                Json(ErrorEnvelope::new(outcome.as_str(), outcome_message(&outcome))),
            )
                .into_response()
        }
        Err(err) if err.is_final_for_webhook() => {
            warn!(error = %err, "webhook event rejected");
            (StatusCode::OK, Json(err.body())).into_response()
        }
        Err(err) => err.into_response(),
    }
}
