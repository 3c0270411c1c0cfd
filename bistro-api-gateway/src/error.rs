use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use bistro_auth_service::{otp::OtpError, AuthError};
use bistro_common::StoreError;
use bistro_order_service::{OrderError, WebhookError};
use bistro_restaurant_service::{CatalogError, SettingsError};
use serde::Serialize;
use tracing::{error, warn};

use crate::models::{Envelope, ErrorBody, ErrorEnvelope};
use crate::state::AppState;

const GENERIC_DEPENDENCY_MESSAGE: &str = "a backing service failed, please retry";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Signature(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("{0}")]
    RateLimited(String),
    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::Signature(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { code, .. } | ApiError::Conflict { code, .. } => code,
            ApiError::MissingHeader(_) => "missing_header",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Signature(_) => "invalid_signature",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::Dependency(_) => "dependency_error",
        }
    }

    /// Business failure reported to a webhook caller as a 200 with
    /// `success: false`, so the provider does not retry it.
    pub fn is_final_for_webhook(&self) -> bool {
        !matches!(
            self,
            ApiError::Dependency(_)
                | ApiError::Conflict { .. }
                | ApiError::MissingHeader(_)
                | ApiError::Signature(_)
        )
    }

    pub fn body(&self) -> ErrorEnvelope {
        let message = match self {
            ApiError::Dependency(_) => GENERIC_DEPENDENCY_MESSAGE.to_string(),
            other => other.to_string(),
        };
        ErrorEnvelope::new(self.code(), message)
    }
}

/// Detail of a dependency failure, kept out of the body unless the app
/// runs in debug mode.
#[derive(Clone, Debug)]
struct DependencyDetail(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let ApiError::Dependency(detail) = self {
            response.extensions_mut().insert(DependencyDetail(detail));
        }
        response
    }
}

/// Rewrites dependency error bodies with their detail when `debug` is set.
pub async fn expose_dependency_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.debug {
        return response;
    }
    match response.extensions().get::<DependencyDetail>().cloned() {
        Some(DependencyDetail(detail)) => (
            response.status(),
            Json(ErrorEnvelope::new("dependency_error", detail)),
        )
            .into_response(),
        None => response,
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!(error = %err, "store failure");
        ApiError::Dependency(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(reason) => ApiError::Unauthenticated(reason.to_string()),
            AuthError::Forbidden => ApiError::Forbidden("insufficient role".to_string()),
            AuthError::Store(err) => err.into(),
        }
    }
}

impl From<OtpError> for ApiError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::InvalidPhone => ApiError::validation("invalid_phone", err.to_string()),
            OtpError::TooManyRequests => ApiError::RateLimited(err.to_string()),
            OtpError::InvalidCode | OtpError::NoActiveChallenge | OtpError::TooManyAttempts => {
                ApiError::Unauthenticated(err.to_string())
            }
            OtpError::AccountDisabled => ApiError::Forbidden(err.to_string()),
            OtpError::Hashing | OtpError::Token(_) => {
                error!(error = %err, "cannot complete login");
                ApiError::Dependency(err.to_string())
            }
            OtpError::Store(err) => err.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ItemNotFound => ApiError::NotFound(err.to_string()),
            CatalogError::InvalidPrice => ApiError::validation("invalid_price", err.to_string()),
            CatalogError::Store(err) => err.into(),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::UnknownKey(_) => ApiError::NotFound(err.to_string()),
            SettingsError::InvalidValue { .. } => {
                ApiError::validation("invalid_setting", err.to_string())
            }
            SettingsError::Store(err) => err.into(),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        let code = err.code();
        match err {
            OrderError::NotFound => ApiError::NotFound(err.to_string()),
            OrderError::Forbidden => ApiError::Forbidden(err.to_string()),
            OrderError::InvalidTransition { .. } | OrderError::Conflict => ApiError::Conflict {
                code,
                message: err.to_string(),
            },
            OrderError::Store(err) => err.into(),
            other => ApiError::Validation {
                code,
                message: other.to_string(),
            },
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MissingHeader(header) => ApiError::MissingHeader(header),
            WebhookError::InvalidPayload(_) => {
                ApiError::validation("invalid_payload", err.to_string())
            }
            other => {
                warn!(error = %other, "webhook rejected");
                ApiError::Signature(other.to_string())
            }
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

#[cfg(test)]
mod tests {
    use bistro_order_service::PromoRejection;

    use super::*;

    #[test]
    fn test_order_errors_map_to_statuses() {
        let cases = [
            (OrderError::EmptyCart, StatusCode::BAD_REQUEST, "empty_cart"),
            (OrderError::NotFound, StatusCode::NOT_FOUND, "not_found"),
            (OrderError::Forbidden, StatusCode::FORBIDDEN, "forbidden"),
            (OrderError::Conflict, StatusCode::CONFLICT, "conflict"),
            (
                OrderError::Promo(PromoRejection::Expired),
                StatusCode::BAD_REQUEST,
                "promo_expired",
            ),
        ];
        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn test_dependency_detail_stays_out_of_body() {
        let err = ApiError::Dependency("connection refused to 10.0.0.5".to_string());

        let body = err.body();

        assert_eq!(body.error.code, "dependency_error");
        assert!(!body.error.message.contains("10.0.0.5"));
        assert!(!err.is_final_for_webhook());
    }

    #[test]
    fn test_webhook_finality() {
        assert!(ApiError::validation("invalid_payload", "bad").is_final_for_webhook());
        assert!(!ApiError::Signature("mismatch".to_string()).is_final_for_webhook());
        assert!(!ApiError::MissingHeader("webhook-id").is_final_for_webhook());
    }
}
