use async_trait::async_trait;
use sqlx::PgPool;

use super::user_models::UserSummary;
use crate::{error::Result, message::UserId};

/// Lookup into the account service's users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve_user(&self, user_id: UserId) -> Result<Option<UserSummary>>;
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn resolve_user(&self, user_id: UserId) -> Result<Option<UserSummary>> {
        // The account service may key users with INT4; widen so both decode.
        let user = sqlx::query_as::<_, UserSummary>(
            "SELECT id::BIGINT AS id, name::TEXT AS name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
