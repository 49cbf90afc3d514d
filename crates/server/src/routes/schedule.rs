use axum::{
    Json, Router,
    extract::{Extension, Query, State},
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{instrument, warn};
use utils::api::schedule::ScheduleResponse;
use uuid::Uuid;

use super::error::ErrorResponse;
use crate::{
    AppState,
    auth::RequestContext,
    db::tasks::TaskRepository,
    policy::{self, TaskScope},
};

const MAX_WINDOW_DAYS: i64 = 366;

pub fn router() -> Router<AppState> {
    Router::new().route("/schedule", get(get_schedule))
}

#[derive(Debug, Deserialize)]
struct ScheduleQuery {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    user_id: Option<Uuid>,
    limit: Option<i64>,
}

#[instrument(
    name = "schedule.get",
    skip(state, ctx, query),
    fields(user_id = %ctx.user.id, from = %query.from, to = %query.to)
)]
async fn get_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ScheduleResponse>, ErrorResponse> {
    let actor = ctx.actor();
    validate_window(query.from, query.to)?;

    // Another user's schedule is narrowed to their own tasks.
    let for_user = match query.user_id {
        Some(user_id) if user_id != actor.user_id => {
            if !policy::can_view_schedule_of(&actor, user_id) {
                warn!(target_user = %user_id, "schedule access denied");
                return Err(ErrorResponse::forbidden("cannot view another user's schedule"));
            }
            Some(user_id)
        }
        _ => None,
    };

    let limit = state.config().clamp_limit(query.limit);
    let tasks = TaskRepository::new(state.pool())
        .list_scheduled(
            &TaskScope::for_actor(&actor),
            for_user,
            query.from,
            query.to,
            limit,
        )
        .await?;

    Ok(Json(ScheduleResponse {
        from: query.from,
        to: query.to,
        tasks,
    }))
}

fn validate_window(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(), ErrorResponse> {
    if from > to {
        return Err(ErrorResponse::bad_request("from must not be after to"));
    }
    if to - from > Duration::days(MAX_WINDOW_DAYS) {
        return Err(ErrorResponse::bad_request(format!(
            "schedule window must not exceed {MAX_WINDOW_DAYS} days"
        )));
    }
    Ok(())
}
