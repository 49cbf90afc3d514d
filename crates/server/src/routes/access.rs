//! Shared lookups that combine loading a row with the policy check for it.

use sqlx::PgPool;
use tracing::warn;
use utils::api::{notifications::NotificationKind, projects::Project};
use uuid::Uuid;

use super::error::ErrorResponse;
use crate::{
    db::{
        notifications::NotificationRepository,
        projects::ProjectRepository,
        tasks::{TaskError, TaskRecord, TaskRepository},
    },
    policy::{self, Actor},
};

/// Loads a task the actor may see. Missing is 404, hidden is 403.
pub(crate) async fn load_visible_task(
    pool: &PgPool,
    actor: &Actor,
    task_id: Uuid,
) -> Result<TaskRecord, ErrorResponse> {
    let record = TaskRepository::new(pool)
        .find_record(task_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("task not found"))?;

    if !policy::can_view_task(actor, &record.facts()) {
        warn!(%task_id, user_id = %actor.user_id, "task access denied");
        return Err(ErrorResponse::forbidden("task not accessible"));
    }

    Ok(record)
}

/// Like [`load_visible_task`] but additionally requires edit rights.
pub(crate) async fn load_editable_task(
    pool: &PgPool,
    actor: &Actor,
    task_id: Uuid,
) -> Result<TaskRecord, ErrorResponse> {
    let record = load_visible_task(pool, actor, task_id).await?;
    if !policy::can_edit_task(actor, &record.facts()) {
        warn!(%task_id, user_id = %actor.user_id, "task edit denied");
        return Err(ErrorResponse::forbidden("task not editable"));
    }
    Ok(record)
}

/// Archived tasks are read-only until restored.
pub(crate) fn ensure_not_archived(record: &TaskRecord) -> Result<(), ErrorResponse> {
    if record.task.is_archived() {
        return Err(TaskError::Archived.into());
    }
    Ok(())
}

pub(crate) async fn load_visible_project(
    pool: &PgPool,
    actor: &Actor,
    project_id: Uuid,
) -> Result<Project, ErrorResponse> {
    let project = ProjectRepository::fetch_by_id(pool, project_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("project not found"))?;

    if !policy::can_view_project(actor, project.department_id) {
        warn!(%project_id, user_id = %actor.user_id, "project access denied");
        return Err(ErrorResponse::forbidden("project not accessible"));
    }

    Ok(project)
}

/// Trims and checks a required name-like field.
pub(crate) fn required_text(
    field: &str,
    value: &str,
    max_chars: usize,
) -> Result<String, ErrorResponse> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ErrorResponse::bad_request(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ErrorResponse::bad_request(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Everyone in `candidates` except `actor_id`, without duplicates.
pub(crate) fn recipients_excluding(candidates: &[Uuid], actor_id: Uuid) -> Vec<Uuid> {
    let mut recipients: Vec<Uuid> = candidates
        .iter()
        .copied()
        .filter(|id| *id != actor_id)
        .collect();
    recipients.sort_unstable();
    recipients.dedup();
    recipients
}

/// Writes notifications after the main change has committed. Failures are
/// logged and never fail the request.
pub(crate) async fn notify(
    pool: &PgPool,
    recipients: &[Uuid],
    task_id: Uuid,
    kind: NotificationKind,
    message: &str,
) {
    if recipients.is_empty() {
        return;
    }
    if let Err(error) = NotificationRepository::new(pool)
        .create_many(recipients, Some(task_id), kind, message)
        .await
    {
        warn!(?error, %task_id, ?kind, "failed to create notifications");
    }
}
