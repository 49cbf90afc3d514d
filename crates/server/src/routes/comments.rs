use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use tracing::{instrument, warn};
use utils::api::{
    comments::{Comment, CreateCommentRequest, ListCommentsResponse},
    notifications::NotificationKind,
};
use uuid::Uuid;

use super::{
    access::{ensure_not_archived, load_visible_task, notify, recipients_excluding},
    error::ErrorResponse,
};
use crate::{
    AppState,
    auth::RequestContext,
    db::comments::{CommentRepository, MAX_COMMENT_BYTES},
    policy,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/tasks/{task_id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/comments/{comment_id}", delete(delete_comment))
}

#[instrument(
    name = "comments.list",
    skip(state, ctx),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn list_comments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ListCommentsResponse>, ErrorResponse> {
    load_visible_task(state.pool(), &ctx.actor(), task_id).await?;
    let comments = CommentRepository::new(state.pool())
        .list_for_task(task_id)
        .await?;
    Ok(Json(ListCommentsResponse { comments }))
}

#[instrument(
    name = "comments.create",
    skip(state, ctx, payload),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn create_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ErrorResponse> {
    let actor = ctx.actor();
    let pool = state.pool();
    let record = load_visible_task(pool, &actor, task_id).await?;
    ensure_not_archived(&record)?;

    let body = comment_body(&payload.body)?;
    let comment = CommentRepository::new(pool)
        .create(task_id, actor.user_id, body)
        .await?;

    let mut candidates = record.assignee_ids.clone();
    candidates.push(record.task.created_by);
    let recipients = recipients_excluding(&candidates, actor.user_id);
    notify(
        pool,
        &recipients,
        task_id,
        NotificationKind::TaskComment,
        &format!("New comment on \"{}\"", record.task.title),
    )
    .await;

    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(
    name = "comments.delete",
    skip(state, ctx),
    fields(comment_id = %comment_id, user_id = %ctx.user.id)
)]
async fn delete_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, ErrorResponse> {
    let actor = ctx.actor();
    let repo = CommentRepository::new(state.pool());
    let comment = repo
        .find(comment_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("comment not found"))?;

    load_visible_task(state.pool(), &actor, comment.task_id).await?;
    if !policy::can_delete_comment(&actor, comment.author_id) {
        warn!("comment delete denied");
        return Err(ErrorResponse::forbidden("only the author or an admin may delete a comment"));
    }

    repo.delete(comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn comment_body(raw: &str) -> Result<&str, ErrorResponse> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ErrorResponse::bad_request("comment body must not be empty"));
    }
    if body.len() > MAX_COMMENT_BYTES {
        return Err(ErrorResponse::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("comment body exceeds {MAX_COMMENT_BYTES} bytes"),
        ));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_body_is_trimmed() {
        assert_eq!(comment_body("  looks good \n").unwrap(), "looks good");
    }

    #[test]
    fn comment_body_limits() {
        assert_eq!(
            comment_body(" \t ").unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
        let long = "x".repeat(MAX_COMMENT_BYTES + 1);
        assert_eq!(
            comment_body(&long).unwrap_err().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert!(comment_body(&"x".repeat(MAX_COMMENT_BYTES)).is_ok());
    }
}
