use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthSessionError {
    #[error("auth session not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn inactivity_duration(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_used_at)
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

pub struct AuthSessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AuthSessionRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, session_id: Uuid) -> Result<AuthSession, AuthSessionError> {
        sqlx::query_as::<_, AuthSession>(
            r#"
            SELECT id, user_id, created_at, last_used_at, revoked_at
            FROM auth_sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(AuthSessionError::NotFound)
    }

    pub async fn touch(&self, session_id: Uuid) -> Result<(), AuthSessionError> {
        sqlx::query("UPDATE auth_sessions SET last_used_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn revoke(&self, session_id: Uuid) -> Result<(), AuthSessionError> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET revoked_at = NOW()
            WHERE id = $1
              AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthSessionError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactivity_measures_since_last_use() {
        let now = Utc::now();
        let session = AuthSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_at: now - Duration::days(10),
            last_used_at: now - Duration::days(3),
            revoked_at: None,
        };
        assert_eq!(session.inactivity_duration(now), Duration::days(3));
        assert!(!session.is_revoked());
    }
}
