use axum::{
    Json, Router,
    extract::{Extension, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;
use utils::api::notifications::{
    ListNotificationsResponse, UpdateNotificationsRequest, UpdateNotificationsResponse,
};

use super::error::ErrorResponse;
use crate::{
    AppState,
    auth::RequestContext,
    db::notifications::{NotificationFilter, NotificationRepository},
};

const MAX_IDS_PER_UPDATE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(list_notifications).patch(update_notifications),
        )
        .route("/notifications/read-all", post(mark_all_read))
}

#[derive(Debug, Default, Deserialize)]
struct ListNotificationsQuery {
    #[serde(default)]
    unread_only: bool,
    #[serde(default)]
    include_archived: bool,
    limit: Option<i64>,
}

#[instrument(name = "notifications.list", skip(state, ctx, query), fields(user_id = %ctx.user.id))]
async fn list_notifications(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ListNotificationsResponse>, ErrorResponse> {
    let repo = NotificationRepository::new(state.pool());
    let filter = NotificationFilter {
        unread_only: query.unread_only,
        include_archived: query.include_archived,
    };
    let limit = state.config().clamp_limit(query.limit);

    let notifications = repo.list(ctx.user.id, filter, limit).await?;
    let unread_count = repo.unread_count(ctx.user.id).await?;
    Ok(Json(ListNotificationsResponse {
        notifications,
        unread_count,
    }))
}

#[instrument(
    name = "notifications.update",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user.id, action = ?payload.action)
)]
async fn update_notifications(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<UpdateNotificationsRequest>,
) -> Result<Json<UpdateNotificationsResponse>, ErrorResponse> {
    validate_id_count(payload.ids.len())?;

    let updated = NotificationRepository::new(state.pool())
        .apply(ctx.user.id, &payload.ids, payload.action)
        .await?;
    Ok(Json(UpdateNotificationsResponse { updated }))
}

#[instrument(name = "notifications.read_all", skip(state, ctx), fields(user_id = %ctx.user.id))]
async fn mark_all_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<UpdateNotificationsResponse>, ErrorResponse> {
    let updated = NotificationRepository::new(state.pool())
        .mark_all_read(ctx.user.id)
        .await?;
    Ok(Json(UpdateNotificationsResponse { updated }))
}

fn validate_id_count(count: usize) -> Result<(), ErrorResponse> {
    if count == 0 || count > MAX_IDS_PER_UPDATE {
        return Err(ErrorResponse::bad_request(format!(
            "ids must contain between 1 and {MAX_IDS_PER_UPDATE} entries"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_count_bounds() {
        assert!(validate_id_count(0).is_err());
        assert!(validate_id_count(1).is_ok());
        assert!(validate_id_count(MAX_IDS_PER_UPDATE).is_ok());
        assert!(validate_id_count(MAX_IDS_PER_UPDATE + 1).is_err());
    }

    #[test]
    fn query_defaults_hide_archived() {
        let query: ListNotificationsQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.unread_only);
        assert!(!query.include_archived);
    }
}
