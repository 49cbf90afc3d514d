//! Task persistence.
//!
//! Every multi-row read goes through [`SCOPE_FILTER`], which applies the
//! caller's [`TaskScope`] as the first three bind parameters.

mod archive;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use utils::api::tasks::{Task, TaskPriority, TaskStatus};
use uuid::Uuid;

use crate::policy::TaskScope;

pub const MAX_TASK_TEXT_BYTES: usize = 50 * 1024;

pub(crate) const TASK_COLUMNS: &str = r#"
    t.id, t.project_id, t.parent_task_id, t.department_id, t.title, t.description,
    t.status, t.priority, t.start_at, t.due_at, t.created_by, t.archived_at,
    t.archived_by, t.created_at, t.updated_at
"#;

/// Visibility predicate over alias `t`; binds `$1` see_all, `$2` user id,
/// `$3` managed department.
const SCOPE_FILTER: &str = r#"
    ($1
     OR t.created_by = $2
     OR EXISTS (
         SELECT 1 FROM task_assignees sa
         WHERE sa.task_id = t.id AND sa.user_id = $2
     )
     OR ($3::uuid IS NOT NULL AND t.department_id = $3))
"#;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("task is already archived")]
    AlreadyArchived,
    #[error("task is not archived")]
    NotArchived,
    #[error("task is archived")]
    Archived,
    #[error("parent task is archived")]
    ParentArchived,
    #[error("start must not be after due date")]
    InvalidSchedule,
    #[error("task title and description are too large")]
    PayloadTooLarge,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct CreateTaskData {
    pub project_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub start_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub assignee_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskData {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub include_archived: bool,
}

/// A task with the ids of its assignees, enough to run the policy checks.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task: Task,
    pub assignee_ids: Vec<Uuid>,
}

impl TaskRecord {
    pub fn facts(&self) -> crate::policy::TaskFacts<'_> {
        crate::policy::TaskFacts {
            created_by: self.task.created_by,
            department_id: self.task.department_id,
            assignee_ids: &self.assignee_ids,
        }
    }
}

pub struct TaskRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TaskRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, task_id: Uuid) -> Result<Option<Task>, TaskError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = $1"
        ))
        .bind(task_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(task)
    }

    /// Loads a task together with its assignee ids.
    pub async fn find_record(&self, task_id: Uuid) -> Result<Option<TaskRecord>, TaskError> {
        let Some(task) = self.find_by_id(task_id).await? else {
            return Ok(None);
        };

        let assignee_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM task_assignees WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_all(self.pool)
        .await?;

        Ok(Some(TaskRecord { task, assignee_ids }))
    }

    pub async fn list(
        &self,
        scope: &TaskScope,
        filter: &TaskFilter,
        limit: i64,
    ) -> Result<Vec<Task>, TaskError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks t
            WHERE {SCOPE_FILTER}
              AND ($4::uuid IS NULL OR t.project_id = $4)
              AND ($5::task_status IS NULL OR t.status = $5)
              AND ($6::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM task_assignees fa
                    WHERE fa.task_id = t.id AND fa.user_id = $6
                  ))
              AND ($7::uuid IS NULL OR t.parent_task_id = $7)
              AND ($8 OR t.archived_at IS NULL)
            ORDER BY t.created_at DESC
            LIMIT $9
            "#
        ))
        .bind(scope.see_all)
        .bind(scope.user_id)
        .bind(scope.managed_department_id)
        .bind(filter.project_id)
        .bind(filter.status)
        .bind(filter.assignee_id)
        .bind(filter.parent_task_id)
        .bind(filter.include_archived)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(tasks)
    }

    /// Non-archived tasks whose schedule window overlaps `[from, to]`.
    ///
    /// A task with only one of `start_at`/`due_at` is treated as a point in time.
    pub async fn list_scheduled(
        &self,
        scope: &TaskScope,
        for_user: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Task>, TaskError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks t
            WHERE {SCOPE_FILTER}
              AND t.archived_at IS NULL
              AND (t.start_at IS NOT NULL OR t.due_at IS NOT NULL)
              AND COALESCE(t.start_at, t.due_at) <= $5
              AND COALESCE(t.due_at, t.start_at) >= $4
              AND ($6::uuid IS NULL
                   OR t.created_by = $6
                   OR EXISTS (
                       SELECT 1 FROM task_assignees ua
                       WHERE ua.task_id = t.id AND ua.user_id = $6
                   ))
            ORDER BY COALESCE(t.due_at, t.start_at) ASC, t.created_at ASC
            LIMIT $7
            "#
        ))
        .bind(scope.see_all)
        .bind(scope.user_id)
        .bind(scope.managed_department_id)
        .bind(from)
        .bind(to)
        .bind(for_user)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(tasks)
    }

    pub async fn count_subtasks(&self, task_id: Uuid) -> Result<i64, TaskError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE parent_task_id = $1",
        )
        .bind(task_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Inserts the task and its initial assignees in one transaction.
    pub async fn create(&self, data: CreateTaskData) -> Result<Task, TaskError> {
        ensure_text_size(&data.title, data.description.as_deref())?;
        ensure_schedule_order(data.start_at, data.due_at)?;

        let mut tx = self.pool.begin().await?;

        // The share lock waits out a concurrent archive of the parent and
        // keeps it from archiving until this insert commits.
        if let Some(parent_id) = data.parent_task_id {
            let parent_archived_at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT archived_at FROM tasks WHERE id = $1 FOR SHARE",
            )
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(TaskError::NotFound)?;
            if parent_archived_at.is_some() {
                return Err(TaskError::ParentArchived);
            }
        }

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks AS t (
                project_id, parent_task_id, department_id, title, description,
                status, priority, start_at, due_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(data.project_id)
        .bind(data.parent_task_id)
        .bind(data.department_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.start_at)
        .bind(data.due_at)
        .bind(data.created_by)
        .fetch_one(&mut *tx)
        .await?;

        if !data.assignee_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO task_assignees (task_id, user_id, assigned_by)
                SELECT $1, assignee, $2
                FROM UNNEST($3::uuid[]) AS assignee
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(task.id)
            .bind(data.created_by)
            .bind(&data.assignee_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(task)
    }

    pub async fn update(&self, task_id: Uuid, data: UpdateTaskData) -> Result<Task, TaskError> {
        let (set_description, description_value) = match data.description {
            None => (false, None),
            Some(value) => (true, value),
        };

        sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks AS t
            SET title       = COALESCE($2, t.title),
                description = CASE WHEN $3 THEN $4 ELSE t.description END,
                status      = COALESCE($5, t.status),
                priority    = COALESCE($6, t.priority),
                updated_at  = NOW()
            WHERE t.id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(data.title)
        .bind(set_description)
        .bind(description_value)
        .bind(data.status)
        .bind(data.priority)
        .fetch_optional(self.pool)
        .await?
        .ok_or(TaskError::NotFound)
    }

    /// Sets or clears the schedule. Outer `None` leaves a field untouched.
    pub async fn update_schedule(
        &self,
        task_id: Uuid,
        start_at: Option<Option<DateTime<Utc>>>,
        due_at: Option<Option<DateTime<Utc>>>,
    ) -> Result<Task, TaskError> {
        let (set_start, start_value) = match start_at {
            None => (false, None),
            Some(value) => (true, value),
        };
        let (set_due, due_value) = match due_at {
            None => (false, None),
            Some(value) => (true, value),
        };

        sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks AS t
            SET start_at   = CASE WHEN $2 THEN $3 ELSE t.start_at END,
                due_at     = CASE WHEN $4 THEN $5 ELSE t.due_at END,
                updated_at = NOW()
            WHERE t.id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(set_start)
        .bind(start_value)
        .bind(set_due)
        .bind(due_value)
        .fetch_optional(self.pool)
        .await
        .map_err(|error| {
            if super::violated_constraint(&error) == Some("tasks_schedule_order") {
                return TaskError::InvalidSchedule;
            }
            TaskError::from(error)
        })?
        .ok_or(TaskError::NotFound)
    }

    /// Hard delete; subtasks, assignments, comments and tag links cascade.
    pub async fn delete(&self, task_id: Uuid) -> Result<(), TaskError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TaskError::NotFound);
        }
        Ok(())
    }
}

pub(crate) fn ensure_text_size(title: &str, description: Option<&str>) -> Result<(), TaskError> {
    let total = title.len() + description.map(|value| value.len()).unwrap_or(0);

    if total > MAX_TASK_TEXT_BYTES {
        return Err(TaskError::PayloadTooLarge);
    }

    Ok(())
}

pub(crate) fn ensure_schedule_order(
    start_at: Option<DateTime<Utc>>,
    due_at: Option<DateTime<Utc>>,
) -> Result<(), TaskError> {
    match (start_at, due_at) {
        (Some(start), Some(due)) if start > due => Err(TaskError::InvalidSchedule),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn text_size_limit_counts_title_and_description() {
        let title = "a".repeat(MAX_TASK_TEXT_BYTES / 2);
        let description = "b".repeat(MAX_TASK_TEXT_BYTES / 2);
        assert!(ensure_text_size(&title, Some(&description)).is_ok());

        let too_long = "c".repeat(MAX_TASK_TEXT_BYTES / 2 + 1);
        assert!(matches!(
            ensure_text_size(&title, Some(&too_long)),
            Err(TaskError::PayloadTooLarge)
        ));
    }

    #[test]
    fn schedule_order_rejects_start_after_due() {
        let now = Utc::now();
        assert!(ensure_schedule_order(Some(now), Some(now + Duration::hours(1))).is_ok());
        assert!(ensure_schedule_order(Some(now), Some(now)).is_ok());
        assert!(ensure_schedule_order(None, Some(now)).is_ok());
        assert!(matches!(
            ensure_schedule_order(Some(now + Duration::hours(1)), Some(now)),
            Err(TaskError::InvalidSchedule)
        ));
    }
}
