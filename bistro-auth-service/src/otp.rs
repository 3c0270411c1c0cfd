use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, Version};
use bistro_common::StoreError;
use bistro_notification_service::{Dispatcher, Notification, NotificationKind};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{OtpChallenge, User};
use crate::store::UserStore;
use crate::token::{IssuedToken, TokenError, TokenIssuer};

#[derive(Debug, Clone)]
pub struct OtpPolicy {
    pub code_ttl: TimeDelta,
    pub max_attempts: i32,
    pub max_requests: i64,
    pub request_window: TimeDelta,
    /// Dialling code prepended to numbers written in national format.
    pub country_code: String,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_ttl: TimeDelta::minutes(5),
            max_attempts: 5,
            max_requests: 3,
            request_window: TimeDelta::minutes(15),
            country_code: "27".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum OtpError {
    #[error("phone number is not valid")]
    InvalidPhone,
    #[error("too many codes requested, try again later")]
    TooManyRequests,
    #[error("verification code is incorrect")]
    InvalidCode,
    #[error("no active verification code, request a new one")]
    NoActiveChallenge,
    #[error("too many incorrect attempts, request a new code")]
    TooManyAttempts,
    #[error("account disabled")]
    AccountDisabled,
    #[error("cannot hash verification code")]
    Hashing,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct OtpRequested {
    pub phone: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: IssuedToken,
    pub user: User,
    pub is_new_user: bool,
}

/// Phone-number login with one-time codes delivered by SMS.
pub struct OtpService {
    store: Arc<dyn UserStore>,
    issuer: Arc<TokenIssuer>,
    dispatcher: Arc<Dispatcher>,
    policy: OtpPolicy,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn UserStore>,
        issuer: Arc<TokenIssuer>,
        dispatcher: Arc<Dispatcher>,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            store,
            issuer,
            dispatcher,
            policy,
        }
    }

    #[instrument(skip(self))]
    pub async fn request(&self, phone: &str, now: DateTime<Utc>) -> Result<OtpRequested, OtpError> {
        let phone =
            normalize_phone(phone, &self.policy.country_code).ok_or(OtpError::InvalidPhone)?;

        let recent = self
            .store
            .count_challenges_since(&phone, now - self.policy.request_window)
            .await?;
        if recent >= self.policy.max_requests {
            warn!(%phone, recent, "otp rate limit reached");
            return Err(OtpError::TooManyRequests);
        }

        let code = generate_code();
        let challenge = OtpChallenge {
            id: Uuid::new_v4(),
            phone: phone.clone(),
            code_hash: hash_code(&code).await?,
            attempts: 0,
            expires_at: now + self.policy.code_ttl,
            consumed_at: None,
            created_at: now,
        };
        self.store.insert_challenge(&challenge).await?;

        self.dispatcher
            .dispatch(Notification {
                kind: NotificationKind::Otp,
                recipient: Some(phone.clone()),
                body: format!(
                    "Your verification code is {code}. It expires in {} minutes.",
                    self.policy.code_ttl.num_minutes()
                ),
                reference_id: Some(challenge.id),
            })
            .await;

        info!(%phone, "otp issued");
        Ok(OtpRequested {
            phone,
            expires_in: self.policy.code_ttl.num_seconds(),
        })
    }

    #[instrument(skip(self, code))]
    pub async fn verify(
        &self,
        phone: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, OtpError> {
        let phone =
            normalize_phone(phone, &self.policy.country_code).ok_or(OtpError::InvalidPhone)?;

        let challenge = self
            .store
            .latest_open_challenge(&phone, now)
            .await?
            .ok_or(OtpError::NoActiveChallenge)?;
        // Attempts are taken before the hash check, never after.
        if !self
            .store
            .claim_attempt(challenge.id, self.policy.max_attempts)
            .await?
        {
            return Err(OtpError::TooManyAttempts);
        }
        if !verify_code(code.trim(), &challenge.code_hash).await {
            return Err(OtpError::InvalidCode);
        }
        if !self.store.consume_challenge(challenge.id, now).await? {
            return Err(OtpError::NoActiveChallenge);
        }

        let (user, is_new_user) = match self.store.find_user_by_phone(&phone).await? {
            Some(user) => (user, false),
            None => {
                let user = self
                    .store
                    .insert_or_get_by_phone(&User::customer(&phone, now))
                    .await?;
                info!(user_id = %user.id, "customer registered");
                (user, true)
            }
        };
        if !user.is_active {
            return Err(OtpError::AccountDisabled);
        }

        let token = self.issuer.issue_default(user.id, user.role)?;
        Ok(Session {
            token,
            user,
            is_new_user,
        })
    }
}

/// Normalises to `+<digits>`. National numbers starting with `0` get
/// `country_code`; `00` is read as an international prefix.
pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let digits = if let Some(rest) = compact.strip_prefix('+') {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = compact.strip_prefix('0') {
        format!("{country_code}{rest}")
    } else {
        compact
    };

    if (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("+{digits}"))
    } else {
        None
    }
}

fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

// Codes live for minutes, so a lighter cost than the password default is enough.
fn hasher() -> Argon2<'static> {
    Params::new(8 * 1024, 2, 1, None)
        .map(|params| Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
        .unwrap_or_default()
}

async fn hash_code(code: &str) -> Result<String, OtpError> {
    let code = code.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        hasher()
            .hash_password(code.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| OtpError::Hashing)
    })
    .await
    .map_err(|_| OtpError::Hashing)?
}

async fn verify_code(code: &str, hash: &str) -> bool {
    let (code, hash) = (code.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || {
        PasswordHash::new(&hash)
            .map(|hash| hasher().verify_password(code.as_bytes(), &hash).is_ok())
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bistro_notification_service::{MemoryNotificationLog, RecordingSender};

    use super::*;
    use crate::models::Role;
    use crate::store::MemoryUserStore;

    struct Fixture {
        service: Arc<OtpService>,
        store: Arc<MemoryUserStore>,
        sender: Arc<RecordingSender>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryUserStore::new());
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = Arc::new(Dispatcher::new(
            sender.clone(),
            Arc::new(MemoryNotificationLog::new()),
            Duration::from_secs(1),
        ));
        let issuer = Arc::new(TokenIssuer::new(b"secret", TimeDelta::hours(1)));
        Fixture {
            service: Arc::new(OtpService::new(
                store.clone(),
                issuer,
                dispatcher,
                OtpPolicy::default(),
            )),
            store,
            sender,
        }
    }

    fn code_from(message: &str) -> String {
        message
            .split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("082 123 4567", "27").as_deref(), Some("+27821234567"));
        assert_eq!(normalize_phone("+27 82-123-4567", "27").as_deref(), Some("+27821234567"));
        assert_eq!(normalize_phone("0027821234567", "27").as_deref(), Some("+27821234567"));
        assert_eq!(normalize_phone("12ab", "27"), None);
        assert_eq!(normalize_phone("+123", "27"), None);
    }

    #[tokio::test]
    async fn test_request_and_verify_registers_customer() {
        let f = fixture();
        let now = Utc::now();

        let requested = f.service.request("0821234567", now).await.unwrap();
        assert_eq!(requested.phone, "+27821234567");
        let code = code_from(&f.sender.last_message_to("+27821234567").unwrap());

        let session = f.service.verify("0821234567", &code, now).await.unwrap();

        assert!(session.is_new_user);
        assert_eq!(session.user.role, Role::Customer);
        assert_eq!(session.token.claims.sub, session.user.id.to_string());
        assert!(f.store.find_user_by_phone("+27821234567").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_code_cannot_be_used_twice() {
        let f = fixture();
        let now = Utc::now();
        f.service.request("0821234567", now).await.unwrap();
        let code = code_from(&f.sender.last_message_to("+27821234567").unwrap());

        f.service.verify("0821234567", &code, now).await.unwrap();
        let second = f.service.verify("0821234567", &code, now).await;

        assert!(matches!(second, Err(OtpError::NoActiveChallenge)));
    }

    #[tokio::test]
    async fn test_wrong_code_counts_attempts() {
        let f = fixture();
        let now = Utc::now();
        f.service.request("0821234567", now).await.unwrap();
        let code = code_from(&f.sender.last_message_to("+27821234567").unwrap());
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..5 {
            assert!(matches!(
                f.service.verify("0821234567", wrong, now).await,
                Err(OtpError::InvalidCode)
            ));
        }

        assert!(matches!(
            f.service.verify("0821234567", &code, now).await,
            Err(OtpError::TooManyAttempts)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_guesses_respect_attempt_cap() {
        let f = fixture();
        let now = Utc::now();
        f.service.request("0821234567", now).await.unwrap();
        let code = code_from(&f.sender.last_message_to("+27821234567").unwrap());
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let guesses: Vec<_> = (0..40)
            .map(|_| {
                let service = f.service.clone();
                tokio::spawn(async move { service.verify("0821234567", wrong, now).await })
            })
            .collect();
        let mut evaluated = 0;
        let mut refused = 0;
        for guess in guesses {
            match guess.await.unwrap() {
                Err(OtpError::InvalidCode) => evaluated += 1,
                Err(OtpError::TooManyAttempts) => refused += 1,
                other => panic!("unexpected verify result: {other:?}"),
            }
        }

        assert_eq!(evaluated, 5);
        assert_eq!(refused, 35);
        assert!(matches!(
            f.service.verify("0821234567", &code, now).await,
            Err(OtpError::TooManyAttempts)
        ));
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected() {
        let f = fixture();
        let now = Utc::now();
        f.service.request("0821234567", now).await.unwrap();
        let code = code_from(&f.sender.last_message_to("+27821234567").unwrap());

        let later = now + TimeDelta::minutes(6);

        assert!(matches!(
            f.service.verify("0821234567", &code, later).await,
            Err(OtpError::NoActiveChallenge)
        ));
    }

    #[tokio::test]
    async fn test_requests_are_rate_limited() {
        let f = fixture();
        let now = Utc::now();

        for _ in 0..3 {
            f.service.request("0821234567", now).await.unwrap();
        }

        assert!(matches!(
            f.service.request("0821234567", now).await,
            Err(OtpError::TooManyRequests)
        ));
        assert!(f
            .service
            .request("0821234567", now + TimeDelta::minutes(16))
            .await
            .is_ok());
    }
}
