use chrono::{TimeDelta, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Role;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token_type: String,
    pub access_token: String,
    pub expires_in: i64,
    pub claims: Claims,
}

#[derive(Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("token malformed")]
    Malformed,
    #[error("cannot issue token")]
    Encoding,
}

/// Issues and verifies HS256 session tokens signed with a server-held secret.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    pub access_token_expires: TimeDelta,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_token_expires: TimeDelta) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_token_expires,
        }
    }

    pub fn issue(
        &self,
        subject: Uuid,
        role: Role,
        ttl: TimeDelta,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let access_token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Encoding)?;
        Ok(IssuedToken {
            token_type: "bearer".to_string(),
            access_token,
            expires_in: ttl.num_seconds(),
            claims,
        })
    }

    pub fn issue_default(&self, subject: Uuid, role: Role) -> Result<IssuedToken, TokenError> {
        self.issue(subject, role, self.access_token_expires)
    }

    /// Stateless check of signature, shape and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    use super::*;

    fn encode_claims(claims: &Claims) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap())
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret", TimeDelta::hours(8))
    }

    #[test]
    fn test_issued_token_verifies() {
        let issuer = issuer();
        let subject = Uuid::new_v4();

        let token = issuer.issue_default(subject, Role::Staff).unwrap();
        let claims = issuer.verify(&token.access_token).unwrap();

        assert_eq!(claims.sub, subject.to_string());
        assert_eq!(claims.role, Role::Staff);
        assert_eq!(token.expires_in, 8 * 3600);
        assert_eq!(claims, token.claims);
    }

    #[test]
    fn test_altered_payload_is_rejected() {
        let issuer = issuer();
        let token = issuer.issue_default(Uuid::new_v4(), Role::Customer).unwrap();

        let mut forged = token.claims.clone();
        forged.role = Role::Admin;
        let parts: Vec<&str> = token.access_token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], encode_claims(&forged), parts[2]);

        assert_eq!(issuer.verify(&tampered), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let other = TokenIssuer::new(b"other-secret", TimeDelta::hours(8));
        let token = other.issue_default(Uuid::new_v4(), Role::Customer).unwrap();

        assert_eq!(issuer().verify(&token.access_token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issuer = issuer();
        let token = issuer
            .issue(Uuid::new_v4(), Role::Customer, TimeDelta::seconds(-30))
            .unwrap();

        assert_eq!(issuer.verify(&token.access_token), Err(TokenError::Expired));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(issuer().verify("not-a-token"), Err(TokenError::Malformed));
    }
}
