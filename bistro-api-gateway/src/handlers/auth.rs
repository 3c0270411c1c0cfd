use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::error::{ok, ApiResult};
use crate::extract::ApiJson;
use crate::models::{
    Envelope, ErrorEnvelope, LogoutResponse, OtpRequest, OtpRequestedResponse, OtpVerifyRequest,
    SessionResponse, UserResponse,
};
use crate::state::AppState;

use super::authenticate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/otp/request", post(request_otp))
        .route("/auth/otp/verify", post(verify_otp))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[utoipa::path(
    post,
    path = "/auth/otp/request",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Code sent by SMS", body = Envelope<OtpRequestedResponse>),
        (status = 400, description = "Phone number not valid", body = ErrorEnvelope),
        (status = 429, description = "Too many codes requested", body = ErrorEnvelope),
    ),
    tag = "auth"
)]
#[instrument(skip(state))]
pub async fn request_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpRequest>,
) -> ApiResult<OtpRequestedResponse> {
    let requested = state.otp.request(&payload.phone, Utc::now()).await?;
    Ok(ok(OtpRequestedResponse {
        phone: requested.phone,
        expires_in: requested.expires_in,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/otp/verify",
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Signed in; new phone numbers are registered as customers", body = Envelope<SessionResponse>),
        (status = 401, description = "Code wrong, expired or used up", body = ErrorEnvelope),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload), fields(phone = %payload.phone))]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpVerifyRequest>,
) -> ApiResult<SessionResponse> {
    let session = state
        .otp
        .verify(&payload.phone, &payload.code, Utc::now())
        .await?;
    info!(user_id = %session.user.id, new = session.is_new_user, "signed in");
    Ok(ok(SessionResponse::new(
        session.token,
        session.user,
        session.is_new_user,
    )))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Token revoked", body = Envelope<LogoutResponse>),
        (status = 401, description = "Unauthenticated", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<LogoutResponse> {
    let identity = authenticate(&state, &headers).await?;
    state.authenticator.logout(&identity).await?;
    Ok(ok(LogoutResponse { revoked: true }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Signed-in user", body = Envelope<UserResponse>),
        (status = 401, description = "Unauthenticated", body = ErrorEnvelope),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(state, headers))]
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<UserResponse> {
    let identity = authenticate(&state, &headers).await?;
    let user = state.authenticator.current_user(&identity).await?;
    Ok(ok(user.into()))
}
