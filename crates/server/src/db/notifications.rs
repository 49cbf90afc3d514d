use sqlx::PgPool;
use thiserror::Error;
use utils::api::notifications::{Notification, NotificationAction, NotificationKind};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, task_id, kind, message, read_at, archived_at, created_at";

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub include_archived: bool,
}

/// All queries are keyed by the recipient, so callers only ever touch their own rows.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        filter: NotificationFilter,
        limit: i64,
    ) -> Result<Vec<Notification>, NotificationError> {
        let notifications = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1
              AND (NOT $2 OR read_at IS NULL)
              AND ($3 OR archived_at IS NULL)
            ORDER BY created_at DESC
            LIMIT $4
            "#
        ))
        .bind(user_id)
        .bind(filter.unread_only)
        .bind(filter.include_archived)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, NotificationError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE user_id = $1
              AND read_at IS NULL
              AND archived_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Applies `action` to the caller's notifications among `ids`.
    pub async fn apply(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
        action: NotificationAction,
    ) -> Result<u64, NotificationError> {
        let sql = match action {
            NotificationAction::Read => {
                "UPDATE notifications SET read_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND read_at IS NULL"
            }
            NotificationAction::Unread => {
                "UPDATE notifications SET read_at = NULL \
                 WHERE user_id = $1 AND id = ANY($2) AND read_at IS NOT NULL"
            }
            NotificationAction::Archive => {
                "UPDATE notifications SET archived_at = NOW(), read_at = COALESCE(read_at, NOW()) \
                 WHERE user_id = $1 AND id = ANY($2) AND archived_at IS NULL"
            }
        };

        let result = sqlx::query(sql)
            .bind(user_id)
            .bind(ids)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, NotificationError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read_at = NOW()
            WHERE user_id = $1
              AND read_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Creates one notification per recipient.
    pub async fn create_many(
        &self,
        recipients: &[Uuid],
        task_id: Option<Uuid>,
        kind: NotificationKind,
        message: &str,
    ) -> Result<u64, NotificationError> {
        if recipients.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, task_id, kind, message)
            SELECT recipient, $2, $3, $4
            FROM UNNEST($1::uuid[]) AS recipient
            "#,
        )
        .bind(recipients)
        .bind(task_id)
        .bind(kind)
        .bind(message)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
