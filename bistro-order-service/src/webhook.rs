use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ID: &str = "webhook-id";
pub const HEADER_TIMESTAMP: &str = "webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "webhook-signature";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("malformed webhook timestamp")]
    InvalidTimestamp,
    #[error("webhook timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("malformed webhook signature header")]
    InvalidSignatureHeader,
    #[error("webhook signature mismatch")]
    SignatureMismatch,
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl WebhookError {
    /// Authentication failures, as opposed to malformed requests.
    pub fn is_signature_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidTimestamp
                | WebhookError::TimestampOutOfTolerance
                | WebhookError::InvalidSignatureHeader
                | WebhookError::SignatureMismatch
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedWebhook {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Checks `v1` HMAC-SHA256 signatures over `{id}.{timestamp}.{body}`.
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance: TimeDelta,
}

impl WebhookVerifier {
    /// `secret` may carry a `whsec_` prefix and is base64-decoded when
    /// possible; otherwise its raw bytes are the key.
    pub fn new(secret: &str, tolerance: TimeDelta) -> Self {
        let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
        let key = STANDARD
            .decode(encoded)
            .unwrap_or_else(|_| secret.as_bytes().to_vec());
        Self { key, tolerance }
    }

    fn mac(&self, id: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    /// Signature header value for `body`, as the provider would send it.
    pub fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
        let digest = self
            .mac(id, &timestamp.to_string(), body)?
            .finalize()
            .into_bytes();
        Ok(format!("v1,{}", STANDARD.encode(digest)))
    }

    pub fn verify(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
        now: DateTime<Utc>,
    ) -> Result<VerifiedWebhook, WebhookError> {
        let id = headers
            .id
            .as_deref()
            .ok_or(WebhookError::MissingHeader(HEADER_ID))?;
        let timestamp = headers
            .timestamp
            .as_deref()
            .ok_or(WebhookError::MissingHeader(HEADER_TIMESTAMP))?;
        let signature = headers
            .signature
            .as_deref()
            .ok_or(WebhookError::MissingHeader(HEADER_SIGNATURE))?;

        let sent_at = timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .ok_or(WebhookError::InvalidTimestamp)?;
        if (now - sent_at).abs() > self.tolerance {
            return Err(WebhookError::TimestampOutOfTolerance);
        }

        let candidates: Vec<Vec<u8>> = signature
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, encoded)| STANDARD.decode(encoded).ok())
            .collect();
        if candidates.is_empty() {
            return Err(WebhookError::InvalidSignatureHeader);
        }

        let mac = self.mac(id, timestamp.trim(), body)?;
        if candidates
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok())
        {
            Ok(VerifiedWebhook {
                id: id.to_string(),
                timestamp: sent_at,
            })
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    Succeeded,
    Failed,
    Other(String),
}

impl PaymentEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentEventKind::Succeeded => "payment.succeeded",
            PaymentEventKind::Failed => "payment.failed",
            PaymentEventKind::Other(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub event_id: String,
    pub kind: PaymentEventKind,
    pub payment_reference: Option<String>,
    pub order_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: RawPayment,
}

#[derive(Deserialize, Default)]
struct RawPayment {
    id: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    order_id: Option<Uuid>,
}

impl PaymentEvent {
    /// Parses a verified body. The event id falls back to the
    /// `webhook-id` header when the body carries none.
    pub fn parse(webhook: &VerifiedWebhook, body: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|err| WebhookError::InvalidPayload(err.to_string()))?;
        let kind = match raw.kind.as_str() {
            "payment.succeeded" => PaymentEventKind::Succeeded,
            "payment.failed" => PaymentEventKind::Failed,
            other => PaymentEventKind::Other(other.to_string()),
        };
        Ok(PaymentEvent {
            event_id: raw
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| webhook.id.clone()),
            kind,
            payment_reference: raw.payload.id,
            order_id: raw.payload.metadata.order_id,
            amount: raw.payload.amount,
            currency: raw.payload.currency,
        })
    }
}
