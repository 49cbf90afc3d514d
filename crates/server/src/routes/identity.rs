use axum::{
    Json, Router,
    extract::{Extension, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::instrument;
use utils::api::users::Profile;

use super::error::ErrorResponse;
use crate::{
    AppState,
    auth::RequestContext,
    db::auth::{AuthSessionError, AuthSessionRepository},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/auth/logout", post(logout))
}

async fn get_me(Extension(ctx): Extension<RequestContext>) -> Json<Profile> {
    Json(ctx.user)
}

#[instrument(
    name = "identity.logout",
    skip(state, ctx),
    fields(user_id = %ctx.user.id, session_id = %ctx.session_id)
)]
async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<StatusCode, ErrorResponse> {
    match AuthSessionRepository::new(state.pool())
        .revoke(ctx.session_id)
        .await
    {
        Ok(()) | Err(AuthSessionError::NotFound) => Ok(StatusCode::NO_CONTENT),
        Err(AuthSessionError::Database(error)) => {
            tracing::error!(?error, "failed to revoke session");
            Err(ErrorResponse::internal())
        }
    }
}
