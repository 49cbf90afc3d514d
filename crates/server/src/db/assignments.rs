use sqlx::PgPool;
use thiserror::Error;
use utils::api::tasks::TaskAssignee;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("user is already assigned to this task")]
    AlreadyAssigned,
    #[error("assignment not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct AssignmentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AssignmentRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, task_id: Uuid) -> Result<Vec<TaskAssignee>, AssignmentError> {
        let assignees = sqlx::query_as::<_, TaskAssignee>(
            r#"
            SELECT a.user_id, p.email, p.display_name, a.assigned_by, a.assigned_at
            FROM task_assignees a
            JOIN profiles p ON p.id = a.user_id
            WHERE a.task_id = $1
            ORDER BY a.assigned_at ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(self.pool)
        .await?;
        Ok(assignees)
    }

    pub async fn add(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        assigned_by: Uuid,
    ) -> Result<TaskAssignee, AssignmentError> {
        sqlx::query_as::<_, TaskAssignee>(
            r#"
            WITH inserted AS (
                INSERT INTO task_assignees (task_id, user_id, assigned_by)
                VALUES ($1, $2, $3)
                RETURNING user_id, assigned_by, assigned_at
            )
            SELECT i.user_id, p.email, p.display_name, i.assigned_by, i.assigned_at
            FROM inserted i
            JOIN profiles p ON p.id = i.user_id
            "#,
        )
        .bind(task_id)
        .bind(user_id)
        .bind(assigned_by)
        .fetch_one(self.pool)
        .await
        .map_err(|error| {
            if super::violated_constraint(&error) == Some("task_assignees_pkey") {
                return AssignmentError::AlreadyAssigned;
            }
            AssignmentError::from(error)
        })
    }

    pub async fn remove(&self, task_id: Uuid, user_id: Uuid) -> Result<(), AssignmentError> {
        let result = sqlx::query("DELETE FROM task_assignees WHERE task_id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AssignmentError::NotFound);
        }
        Ok(())
    }
}
