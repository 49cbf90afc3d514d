//! Archive and restore of a task together with all of its subtasks.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{TaskError, TaskRepository};
use crate::db::Tx;

#[derive(sqlx::FromRow)]
struct LockedTask {
    archived_at: Option<DateTime<Utc>>,
    parent_archived_at: Option<DateTime<Utc>>,
}

impl TaskRepository<'_> {
    /// Archives `task_id` and every not-yet-archived descendant.
    ///
    /// Returns the number of subtasks archived alongside the task itself.
    pub async fn archive_cascade(
        &self,
        task_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<u64, TaskError> {
        let mut tx = self.pool.begin().await?;

        let locked = lock_task(&mut tx, task_id).await?;
        if locked.archived_at.is_some() {
            return Err(TaskError::AlreadyArchived);
        }

        sqlx::query(
            r#"
            UPDATE tasks
            SET archived_at = NOW(), archived_by = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(acting_user_id)
        .execute(&mut *tx)
        .await?;

        // Each pass runs on a fresh snapshot. A subtask insert holds a share
        // lock on its parent, so a pass that had to wait on that lock leaves
        // the new child for the next pass. The subtree is settled once a pass
        // finds nothing left to archive.
        let mut subtasks = 0;
        loop {
            let archived = sqlx::query(
                r#"
                WITH RECURSIVE descendants AS (
                    SELECT id FROM tasks WHERE parent_task_id = $1
                    UNION
                    SELECT child.id
                    FROM tasks child
                    JOIN descendants d ON child.parent_task_id = d.id
                )
                UPDATE tasks
                SET archived_at = NOW(), archived_by = $2, updated_at = NOW()
                WHERE id IN (SELECT id FROM descendants)
                  AND archived_at IS NULL
                "#,
            )
            .bind(task_id)
            .bind(acting_user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if archived == 0 {
                break;
            }
            subtasks += archived;
        }

        tx.commit().await?;

        tracing::debug!(%task_id, subtasks, "archived task subtree");
        Ok(subtasks)
    }

    /// Restores `task_id` and every archived descendant.
    ///
    /// A subtask cannot be restored while its parent stays archived.
    pub async fn restore_cascade(&self, task_id: Uuid) -> Result<u64, TaskError> {
        let mut tx = self.pool.begin().await?;

        let locked = lock_task(&mut tx, task_id).await?;
        if locked.archived_at.is_none() {
            return Err(TaskError::NotArchived);
        }
        if locked.parent_archived_at.is_some() {
            return Err(TaskError::ParentArchived);
        }

        sqlx::query(
            r#"
            UPDATE tasks
            SET archived_at = NULL, archived_by = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

        let subtasks = sqlx::query(
            r#"
            WITH RECURSIVE descendants AS (
                SELECT id FROM tasks WHERE parent_task_id = $1
                UNION
                SELECT child.id
                FROM tasks child
                JOIN descendants d ON child.parent_task_id = d.id
            )
            UPDATE tasks
            SET archived_at = NULL, archived_by = NULL, updated_at = NOW()
            WHERE id IN (SELECT id FROM descendants)
              AND archived_at IS NOT NULL
            "#,
        )
        .bind(task_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::debug!(%task_id, subtasks, "restored task subtree");
        Ok(subtasks)
    }
}

async fn lock_task(tx: &mut Tx<'_>, task_id: Uuid) -> Result<LockedTask, TaskError> {
    sqlx::query_as::<_, LockedTask>(
        r#"
        SELECT t.archived_at, parent.archived_at AS parent_archived_at
        FROM tasks t
        LEFT JOIN tasks parent ON parent.id = t.parent_task_id
        WHERE t.id = $1
        FOR UPDATE OF t
        "#,
    )
    .bind(task_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(TaskError::NotFound)
}
