use std::sync::Arc;

use bistro_common::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Role, User};
use crate::store::UserStore;
use crate::token::{TokenError, TokenIssuer};

/// Caller resolved from a verified token and the current user row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),
    #[error("insufficient role")]
    Forbidden,
    #[error("auth store unavailable: {0}")]
    Store(#[from] StoreError),
}

pub fn require_role(identity: &Identity, required: Role) -> Result<(), AuthError> {
    if identity.role.satisfies(required) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

pub fn require_any_role(identity: &Identity, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

pub struct Authenticator {
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn UserStore>,
}

impl Authenticator {
    pub fn new(issuer: Arc<TokenIssuer>, store: Arc<dyn UserStore>) -> Self {
        Self { issuer, store }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Resolves an `Authorization` header value of the form `Bearer <token>`.
    pub async fn resolve_bearer(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let header = header.ok_or(AuthError::Unauthenticated("missing bearer token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or(AuthError::Unauthenticated("missing bearer token"))?;
        self.resolve(token.trim()).await
    }

    pub async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.issuer.verify(token).map_err(|err| {
            debug!(error = %err, "token rejected");
            match err {
                TokenError::Expired => AuthError::Unauthenticated("token expired"),
                _ => AuthError::Unauthenticated("invalid token"),
            }
        })?;
        let user_id = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| AuthError::Unauthenticated("invalid token subject"))?;

        if self.store.is_revoked(&claims.jti).await? {
            return Err(AuthError::Unauthenticated("token revoked"));
        }
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated("unknown user"))?;
        if !user.is_active {
            return Err(AuthError::Unauthenticated("account disabled"));
        }

        Ok(Identity {
            user_id,
            role: user.role,
            token_id: claims.jti,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now),
        })
    }

    pub async fn current_user(&self, identity: &Identity) -> Result<User, AuthError> {
        self.store
            .find_user(identity.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated("unknown user"))
    }

    pub async fn logout(&self, identity: &Identity) -> Result<(), AuthError> {
        self.store
            .revoke_token(&identity.token_id, identity.expires_at)
            .await?;
        Ok(())
    }
}
