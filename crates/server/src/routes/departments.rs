//! Departments and the users that belong to them.

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tracing::instrument;
use utils::api::users::{
    CreateDepartmentRequest, ListDepartmentsResponse, ListUsersResponse, Profile, Role,
    UpdateUserRequest,
};
use uuid::Uuid;

use super::{access::required_text, error::ErrorResponse};
use crate::{
    AppState,
    auth::RequestContext,
    db::{departments::DepartmentRepository, profiles::ProfileRepository},
};

const MAX_DEPARTMENT_NAME_CHARS: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new().route("/departments", get(list_departments))
}

pub fn manager_router() -> Router<AppState> {
    Router::new().route("/users", get(list_users))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/departments", post(create_department))
        .route("/users/{user_id}", patch(update_user))
}

async fn list_departments(
    State(state): State<AppState>,
) -> Result<Json<ListDepartmentsResponse>, ErrorResponse> {
    let departments = DepartmentRepository::new(state.pool()).list().await?;
    Ok(Json(ListDepartmentsResponse { departments }))
}

#[instrument(
    name = "departments.create",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user.id)
)]
async fn create_department(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateDepartmentRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let name = required_text("name", &payload.name, MAX_DEPARTMENT_NAME_CHARS)?;
    let department = DepartmentRepository::new(state.pool()).create(&name).await?;
    tracing::info!(department_id = %department.id, "department created");
    Ok((StatusCode::CREATED, Json(department)))
}

/// Managers see their own department, admins see everyone.
#[instrument(name = "users.list", skip(state, ctx), fields(user_id = %ctx.user.id))]
async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<ListUsersResponse>, ErrorResponse> {
    let repo = ProfileRepository::new(state.pool());
    let users = match (ctx.user.role, ctx.user.department_id) {
        (Role::Admin, _) => repo.list(None).await?,
        (_, Some(department_id)) => repo.list(Some(department_id)).await?,
        (_, None) => vec![ctx.user.clone()],
    };
    Ok(Json(ListUsersResponse { users }))
}

#[instrument(
    name = "users.update",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user.id, target_user_id = %target_user_id)
)]
async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(target_user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<Profile>, ErrorResponse> {
    ensure_not_self_role_change(ctx.user.id, target_user_id, &payload)?;

    if payload.role.is_none() && payload.department_id.is_none() {
        return Err(ErrorResponse::bad_request("nothing to update"));
    }

    let profile = ProfileRepository::new(state.pool())
        .update(target_user_id, payload.role, payload.department_id)
        .await?;

    tracing::info!(role = %profile.role, "user updated");
    Ok(Json(profile))
}

/// An admin may move themself between departments but not change their own role.
fn ensure_not_self_role_change(
    actor_id: Uuid,
    target_user_id: Uuid,
    payload: &UpdateUserRequest,
) -> Result<(), ErrorResponse> {
    if actor_id == target_user_id && payload.role.is_some() {
        return Err(ErrorResponse::bad_request("cannot change your own role"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_role_change_is_rejected() {
        let me = Uuid::new_v4();
        let payload = UpdateUserRequest {
            role: Some(Role::Staff),
            department_id: None,
        };
        let err = ensure_not_self_role_change(me, me, &payload).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn self_department_change_is_allowed() {
        let me = Uuid::new_v4();
        let payload = UpdateUserRequest {
            role: None,
            department_id: Some(Some(Uuid::new_v4())),
        };
        assert!(ensure_not_self_role_change(me, me, &payload).is_ok());
        assert!(
            ensure_not_self_role_change(
                me,
                Uuid::new_v4(),
                &UpdateUserRequest {
                    role: Some(Role::Manager),
                    department_id: None
                }
            )
            .is_ok()
        );
    }
}
