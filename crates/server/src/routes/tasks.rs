use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use utils::api::{
    notifications::NotificationKind,
    tasks::{
        ArchiveTaskResponse, AssignTaskRequest, CreateTaskRequest, ListAssigneesResponse,
        ListTasksResponse, Task, TaskAssignee, TaskDetail, TaskStatus, UpdateScheduleRequest,
        UpdateTaskRequest,
    },
    users::Profile,
};
use uuid::Uuid;

use super::{
    access::{
        ensure_not_archived, load_editable_task, load_visible_project, load_visible_task, notify,
        recipients_excluding, required_text,
    },
    error::ErrorResponse,
};
use crate::{
    AppState,
    auth::RequestContext,
    db::{
        assignments::AssignmentRepository,
        profiles::ProfileRepository,
        tags::TagRepository,
        tasks::{
            CreateTaskData, MAX_TASK_TEXT_BYTES, TaskError, TaskFilter, TaskRecord,
            TaskRepository, UpdateTaskData, ensure_schedule_order, ensure_text_size,
        },
    },
    policy::{self, Actor, TaskFacts, TaskScope},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{task_id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/tasks/{task_id}/subtasks", get(list_subtasks))
        .route("/tasks/{task_id}/schedule", patch(update_schedule))
        .route(
            "/tasks/{task_id}/assignees",
            get(list_assignees).post(assign_user),
        )
        .route("/tasks/{task_id}/assignees/{user_id}", delete(unassign_user))
}

/// Archive and restore, mounted behind the manager gate.
pub fn manager_router() -> Router<AppState> {
    Router::new()
        .route("/tasks/{task_id}/archive", post(archive_task))
        .route("/tasks/{task_id}/restore", post(restore_task))
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    project_id: Option<Uuid>,
    status: Option<TaskStatus>,
    assignee_id: Option<Uuid>,
    parent_task_id: Option<Uuid>,
    #[serde(default)]
    include_archived: bool,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SubtasksQuery {
    #[serde(default)]
    include_archived: bool,
    limit: Option<i64>,
}

#[instrument(name = "tasks.list", skip(state, ctx, query), fields(user_id = %ctx.user.id))]
async fn list_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<ListTasksResponse>, ErrorResponse> {
    let scope = TaskScope::for_actor(&ctx.actor());
    let filter = TaskFilter {
        project_id: query.project_id,
        status: query.status,
        assignee_id: query.assignee_id,
        parent_task_id: query.parent_task_id,
        include_archived: query.include_archived,
    };
    let limit = state.config().clamp_limit(query.limit);

    let tasks = TaskRepository::new(state.pool())
        .list(&scope, &filter, limit)
        .await?;
    Ok(Json(ListTasksResponse { tasks }))
}

#[instrument(name = "tasks.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let actor = ctx.actor();
    let pool = state.pool();

    let title = required_text("title", &payload.title, MAX_TASK_TEXT_BYTES)?;
    let description = payload
        .description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    ensure_text_size(&title, description.as_deref())?;
    ensure_schedule_order(payload.start_at, payload.due_at)?;

    let (project_id, department_id) = match payload.parent_task_id {
        Some(parent_id) => {
            let parent = load_visible_task(pool, &actor, parent_id).await?;
            if parent.task.is_archived() {
                return Err(TaskError::ParentArchived.into());
            }
            if payload
                .project_id
                .is_some_and(|project_id| Some(project_id) != parent.task.project_id)
            {
                return Err(ErrorResponse::bad_request(
                    "subtasks belong to their parent's project",
                ));
            }
            (parent.task.project_id, parent.task.department_id)
        }
        None => match payload.project_id {
            Some(project_id) => {
                let project = load_visible_project(pool, &actor, project_id).await?;
                (Some(project.id), project.department_id)
            }
            None => (None, actor.department_id),
        },
    };

    let assignee_ids = dedup_ids(payload.assignee_ids);
    let facts = TaskFacts {
        created_by: actor.user_id,
        department_id,
        assignee_ids: &[],
    };
    for assignee_id in &assignee_ids {
        let assignee = load_assignee(pool, *assignee_id).await?;
        ensure_can_assign(&actor, &facts, &assignee)?;
    }

    let task = TaskRepository::new(pool)
        .create(CreateTaskData {
            project_id,
            parent_task_id: payload.parent_task_id,
            department_id,
            title,
            description,
            status: payload.status.unwrap_or_default(),
            priority: payload.priority.unwrap_or_default(),
            start_at: payload.start_at,
            due_at: payload.due_at,
            created_by: actor.user_id,
            assignee_ids: assignee_ids.clone(),
        })
        .await?;

    info!(task_id = %task.id, assignees = assignee_ids.len(), "task created");

    let recipients = recipients_excluding(&assignee_ids, actor.user_id);
    notify(
        pool,
        &recipients,
        task.id,
        NotificationKind::TaskAssigned,
        &format!("You were assigned to \"{}\"", task.title),
    )
    .await;

    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(
    name = "tasks.get",
    skip(state, ctx),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskDetail>, ErrorResponse> {
    let pool = state.pool();
    let record = load_visible_task(pool, &ctx.actor(), task_id).await?;

    let assignees = AssignmentRepository::new(pool).list(task_id).await?;
    let tags = TagRepository::new(pool).for_task(task_id).await?;
    let subtask_count = TaskRepository::new(pool).count_subtasks(task_id).await?;

    Ok(Json(TaskDetail {
        task: record.task,
        assignees,
        tags,
        subtask_count,
    }))
}

#[instrument(
    name = "tasks.update",
    skip(state, ctx, payload),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ErrorResponse> {
    let actor = ctx.actor();
    let pool = state.pool();
    let record = load_editable_task(pool, &actor, task_id).await?;
    ensure_not_archived(&record)?;

    let title = payload
        .title
        .as_deref()
        .map(|title| required_text("title", title, MAX_TASK_TEXT_BYTES))
        .transpose()?;
    let description = payload.description.map(|value| {
        value
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    });

    let effective_title = title.as_deref().unwrap_or(&record.task.title);
    let effective_description = match &description {
        Some(value) => value.as_deref(),
        None => record.task.description.as_deref(),
    };
    ensure_text_size(effective_title, effective_description)?;

    let previous_status = record.task.status;
    let task = TaskRepository::new(pool)
        .update(
            task_id,
            UpdateTaskData {
                title,
                description,
                status: payload.status,
                priority: payload.priority,
            },
        )
        .await?;

    if task.status != previous_status {
        let mut candidates = record.assignee_ids.clone();
        candidates.push(record.task.created_by);
        let recipients = recipients_excluding(&candidates, actor.user_id);
        notify(
            pool,
            &recipients,
            task_id,
            NotificationKind::TaskStatusChanged,
            &format!("\"{}\" moved to {}", task.title, status_label(task.status)),
        )
        .await;
    }

    Ok(Json(task))
}

#[instrument(
    name = "tasks.delete",
    skip(state, ctx),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ErrorResponse> {
    let actor = ctx.actor();
    let record = load_visible_task(state.pool(), &actor, task_id).await?;

    if !policy::can_delete_task(&actor, &record.facts()) {
        warn!("task delete denied");
        return Err(ErrorResponse::forbidden("only the creator or an admin may delete a task"));
    }

    TaskRepository::new(state.pool()).delete(task_id).await?;
    info!("task deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(
    name = "tasks.subtasks",
    skip(state, ctx, query),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn list_subtasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<SubtasksQuery>,
) -> Result<Json<ListTasksResponse>, ErrorResponse> {
    let actor = ctx.actor();
    load_visible_task(state.pool(), &actor, task_id).await?;

    let filter = TaskFilter {
        parent_task_id: Some(task_id),
        include_archived: query.include_archived,
        ..Default::default()
    };
    let limit = state.config().clamp_limit(query.limit);
    let tasks = TaskRepository::new(state.pool())
        .list(&TaskScope::for_actor(&actor), &filter, limit)
        .await?;
    Ok(Json(ListTasksResponse { tasks }))
}

#[instrument(
    name = "tasks.schedule.update",
    skip(state, ctx, payload),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn update_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateScheduleRequest>,
) -> Result<Json<Task>, ErrorResponse> {
    let record = load_editable_task(state.pool(), &ctx.actor(), task_id).await?;
    ensure_not_archived(&record)?;

    let start_at = payload.start_at.unwrap_or(record.task.start_at);
    let due_at = payload.due_at.unwrap_or(record.task.due_at);
    ensure_schedule_order(start_at, due_at)?;

    let task = TaskRepository::new(state.pool())
        .update_schedule(task_id, payload.start_at, payload.due_at)
        .await?;
    Ok(Json(task))
}

#[instrument(
    name = "tasks.assignees.list",
    skip(state, ctx),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn list_assignees(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ListAssigneesResponse>, ErrorResponse> {
    load_visible_task(state.pool(), &ctx.actor(), task_id).await?;
    let assignees = AssignmentRepository::new(state.pool()).list(task_id).await?;
    Ok(Json(ListAssigneesResponse { assignees }))
}

#[instrument(
    name = "tasks.assignees.add",
    skip(state, ctx, payload),
    fields(task_id = %task_id, user_id = %ctx.user.id, assignee_id = %payload.user_id)
)]
async fn assign_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<AssignTaskRequest>,
) -> Result<(StatusCode, Json<TaskAssignee>), ErrorResponse> {
    let actor = ctx.actor();
    let pool = state.pool();
    let record = load_visible_task(pool, &actor, task_id).await?;
    ensure_not_archived(&record)?;

    let assignee = load_assignee(pool, payload.user_id).await?;
    ensure_can_assign(&actor, &record.facts(), &assignee)?;

    let assigned = AssignmentRepository::new(pool)
        .add(task_id, assignee.id, actor.user_id)
        .await?;

    let recipients = recipients_excluding(&[assignee.id], actor.user_id);
    notify(
        pool,
        &recipients,
        task_id,
        NotificationKind::TaskAssigned,
        &format!("You were assigned to \"{}\"", record.task.title),
    )
    .await;

    Ok((StatusCode::CREATED, Json(assigned)))
}

#[instrument(
    name = "tasks.assignees.remove",
    skip(state, ctx),
    fields(task_id = %task_id, user_id = %ctx.user.id, assignee_id = %assignee_id)
)]
async fn unassign_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((task_id, assignee_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ErrorResponse> {
    let actor = ctx.actor();
    let record = load_visible_task(state.pool(), &actor, task_id).await?;
    ensure_not_archived(&record)?;

    if !policy::can_unassign(&actor, &record.facts(), assignee_id) {
        warn!("unassign denied");
        return Err(ErrorResponse::forbidden("cannot remove this assignee"));
    }

    AssignmentRepository::new(state.pool())
        .remove(task_id, assignee_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(
    name = "tasks.archive",
    skip(state, ctx),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn archive_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ArchiveTaskResponse>, ErrorResponse> {
    let actor = ctx.actor();
    let pool = state.pool();
    let record = load_archivable_task(pool, &actor, task_id).await?;

    let subtasks = TaskRepository::new(pool)
        .archive_cascade(task_id, actor.user_id)
        .await?;
    info!(subtasks, "task archived");

    let recipients = recipients_excluding(&record.assignee_ids, actor.user_id);
    notify(
        pool,
        &recipients,
        task_id,
        NotificationKind::TaskArchived,
        &format!("\"{}\" was archived", record.task.title),
    )
    .await;

    Ok(Json(ArchiveTaskResponse::new(task_id, subtasks)))
}

#[instrument(
    name = "tasks.restore",
    skip(state, ctx),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn restore_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ArchiveTaskResponse>, ErrorResponse> {
    let actor = ctx.actor();
    let pool = state.pool();
    let record = load_archivable_task(pool, &actor, task_id).await?;

    let subtasks = TaskRepository::new(pool).restore_cascade(task_id).await?;
    info!(subtasks, "task restored");

    let recipients = recipients_excluding(&record.assignee_ids, actor.user_id);
    notify(
        pool,
        &recipients,
        task_id,
        NotificationKind::TaskRestored,
        &format!("\"{}\" was restored", record.task.title),
    )
    .await;

    Ok(Json(ArchiveTaskResponse::new(task_id, subtasks)))
}

async fn load_archivable_task(
    pool: &sqlx::PgPool,
    actor: &Actor,
    task_id: Uuid,
) -> Result<TaskRecord, ErrorResponse> {
    let record = load_visible_task(pool, actor, task_id).await?;
    if !policy::can_archive_task(actor, &record.facts()) {
        warn!("archive denied");
        return Err(ErrorResponse::forbidden("task cannot be archived by this user"));
    }
    Ok(record)
}

async fn load_assignee(pool: &sqlx::PgPool, user_id: Uuid) -> Result<Profile, ErrorResponse> {
    ProfileRepository::new(pool)
        .find(user_id)
        .await?
        .ok_or_else(|| ErrorResponse::bad_request(format!("user {user_id} does not exist")))
}

fn ensure_can_assign(
    actor: &Actor,
    task: &TaskFacts<'_>,
    assignee: &Profile,
) -> Result<(), ErrorResponse> {
    if !policy::can_assign(actor, task, assignee) {
        warn!(assignee_id = %assignee.id, "assignment denied");
        return Err(ErrorResponse::forbidden(format!(
            "not allowed to assign {}",
            assignee.email
        )));
    }
    Ok(())
}

fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::InProgress => "in progress",
        TaskStatus::InReview => "in review",
        TaskStatus::Done => "done",
        TaskStatus::Cancelled => "cancelled",
    }
}
