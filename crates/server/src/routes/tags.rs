use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, put},
};
use tracing::instrument;
use utils::api::tags::{CreateTagRequest, ListTagsResponse, SetTaskTagsRequest, Tag};
use uuid::Uuid;

use super::{
    access::{ensure_not_archived, load_editable_task, required_text},
    error::ErrorResponse,
};
use crate::{AppState, auth::RequestContext, db::tags::TagRepository};

const MAX_TAG_NAME_CHARS: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tasks/{task_id}/tags", put(set_task_tags))
}

#[instrument(name = "tags.list", skip(state))]
async fn list_tags(State(state): State<AppState>) -> Result<Json<ListTagsResponse>, ErrorResponse> {
    let tags = TagRepository::new(state.pool()).list().await?;
    Ok(Json(ListTagsResponse { tags }))
}

#[instrument(name = "tags.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
async fn create_tag(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), ErrorResponse> {
    let name = required_text("name", &payload.name, MAX_TAG_NAME_CHARS)?;
    let color = normalize_color(&payload.color)
        .ok_or_else(|| ErrorResponse::bad_request("color must look like #rrggbb"))?;

    let tag = TagRepository::new(state.pool())
        .create(&name, &color, ctx.user.id)
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[instrument(
    name = "tags.set_for_task",
    skip(state, ctx, payload),
    fields(task_id = %task_id, user_id = %ctx.user.id)
)]
async fn set_task_tags(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<SetTaskTagsRequest>,
) -> Result<Json<ListTagsResponse>, ErrorResponse> {
    let record = load_editable_task(state.pool(), &ctx.actor(), task_id).await?;
    ensure_not_archived(&record)?;

    let tags = TagRepository::new(state.pool())
        .replace_for_task(task_id, &payload.tag_ids)
        .await?;
    Ok(Json(ListTagsResponse { tags }))
}

/// Accepts `#rrggbb` in any case and returns it lowercased.
fn normalize_color(raw: &str) -> Option<String> {
    let hex = raw.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", hex.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_validated_and_lowercased() {
        assert_eq!(normalize_color("#6B7280").as_deref(), Some("#6b7280"));
        assert_eq!(normalize_color(" #00ff00 ").as_deref(), Some("#00ff00"));
        assert!(normalize_color("6b7280").is_none());
        assert!(normalize_color("#6b728").is_none());
        assert!(normalize_color("#zzzzzz").is_none());
    }
}
