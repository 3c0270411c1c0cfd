use std::collections::HashMap;

use async_trait::async_trait;
use bistro_common::{connection, DbPool, StoreError};
use chrono::{DateTime, Utc};
use diesel::{dsl::count_star, insert_into, prelude::*, update};
use diesel_async::RunQueryDsl;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{OtpChallenge, RevokedToken, User};
use crate::schema;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError>;

    /// Inserts `user` unless the phone number is already taken, then returns
    /// whichever row owns the phone.
    async fn insert_or_get_by_phone(&self, user: &User) -> Result<User, StoreError>;

    async fn insert_challenge(&self, challenge: &OtpChallenge) -> Result<(), StoreError>;

    async fn count_challenges_since(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Newest challenge for `phone` that is neither consumed nor expired.
    async fn latest_open_challenge(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError>;

    /// Counts one attempt against an open challenge while fewer than
    /// `max_attempts` were made; returns whether the attempt was granted.
    async fn claim_attempt(
        &self,
        challenge_id: Uuid,
        max_attempts: i32,
    ) -> Result<bool, StoreError>;

    /// Marks the challenge consumed if nobody else did; returns whether this
    /// call won.
    async fn consume_challenge(
        &self,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError>;
}

pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(schema::users::table
            .select(User::as_select())
            .find(id)
            .first(conn)
            .await
            .optional()?)
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        Ok(schema::users::table
            .select(User::as_select())
            .filter(schema::users::phone.eq(phone))
            .first(conn)
            .await
            .optional()?)
    }

    async fn insert_or_get_by_phone(&self, user: &User) -> Result<User, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        insert_into(schema::users::table)
            .values(user)
            .on_conflict(schema::users::phone)
            .do_nothing()
            .execute(conn)
            .await?;
        Ok(schema::users::table
            .select(User::as_select())
            .filter(schema::users::phone.eq(&user.phone))
            .first(conn)
            .await?)
    }

    async fn insert_challenge(&self, challenge: &OtpChallenge) -> Result<(), StoreError> {
        let conn = &mut connection(&self.pool).await?;
        insert_into(schema::otp_challenges::table)
            .values(challenge)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn count_challenges_since(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        use schema::otp_challenges::dsl;

        let conn = &mut connection(&self.pool).await?;
        Ok(dsl::otp_challenges
            .filter(dsl::phone.eq(phone))
            .filter(dsl::created_at.gt(since))
            .select(count_star())
            .first(conn)
            .await?)
    }

    async fn latest_open_challenge(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError> {
        use schema::otp_challenges::dsl;

        let conn = &mut connection(&self.pool).await?;
        Ok(dsl::otp_challenges
            .select(OtpChallenge::as_select())
            .filter(dsl::phone.eq(phone))
            .filter(dsl::consumed_at.is_null())
            .filter(dsl::expires_at.gt(now))
            .order(dsl::created_at.desc())
            .first(conn)
            .await
            .optional()?)
    }

    async fn claim_attempt(
        &self,
        challenge_id: Uuid,
        max_attempts: i32,
    ) -> Result<bool, StoreError> {
        use schema::otp_challenges::dsl;

        let conn = &mut connection(&self.pool).await?;
        let updated = update(
            dsl::otp_challenges
                .find(challenge_id)
                .filter(dsl::attempts.lt(max_attempts))
                .filter(dsl::consumed_at.is_null()),
        )
        .set(dsl::attempts.eq(dsl::attempts + 1))
        .execute(conn)
        .await?;
        Ok(updated == 1)
    }

    async fn consume_challenge(
        &self,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        use schema::otp_challenges::dsl;

        let conn = &mut connection(&self.pool).await?;
        let updated = update(
            dsl::otp_challenges
                .find(challenge_id)
                .filter(dsl::consumed_at.is_null()),
        )
        .set(dsl::consumed_at.eq(Some(now)))
        .execute(conn)
        .await?;
        Ok(updated == 1)
    }

    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = &mut connection(&self.pool).await?;
        insert_into(schema::revoked_tokens::table)
            .values(RevokedToken {
                jti: jti.to_string(),
                expires_at,
            })
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        let conn = &mut connection(&self.pool).await?;
        let found = schema::revoked_tokens::table
            .find(jti)
            .select(schema::revoked_tokens::jti)
            .first::<String>(conn)
            .await
            .optional()?;
        Ok(found.is_some())
    }
}

#[derive(Default)]
struct MemoryUsers {
    users: HashMap<Uuid, User>,
    challenges: Vec<OtpChallenge>,
    revoked: HashMap<String, DateTime<Utc>>,
}

/// In-process store for tests and local runs.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<MemoryUsers>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.inner.lock().await.users.insert(user.id, user);
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) {
        if let Some(user) = self.inner.lock().await.users.get_mut(&id) {
            user.is_active = is_active;
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn insert_or_get_by_phone(&self, user: &User) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .users
            .values()
            .find(|u| u.phone.is_some() && u.phone == user.phone)
        {
            return Ok(existing.clone());
        }
        inner.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn insert_challenge(&self, challenge: &OtpChallenge) -> Result<(), StoreError> {
        self.inner.lock().await.challenges.push(challenge.clone());
        Ok(())
    }

    async fn count_challenges_since(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .challenges
            .iter()
            .filter(|c| c.phone == phone && c.created_at > since)
            .count() as i64)
    }

    async fn latest_open_challenge(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpChallenge>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .challenges
            .iter()
            .filter(|c| c.phone == phone && c.consumed_at.is_none() && c.expires_at > now)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn claim_attempt(
        &self,
        challenge_id: Uuid,
        max_attempts: i32,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.challenges.iter_mut().find(|c| {
            c.id == challenge_id && c.consumed_at.is_none() && c.attempts < max_attempts
        }) {
            Some(challenge) => {
                challenge.attempts += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn consume_challenge(
        &self,
        challenge_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner
            .challenges
            .iter_mut()
            .find(|c| c.id == challenge_id && c.consumed_at.is_none())
        {
            Some(challenge) => {
                challenge.consumed_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .revoked
            .insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.revoked.contains_key(jti))
    }
}
