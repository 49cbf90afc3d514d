use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tracing::{instrument, warn};
use utils::api::projects::{
    CreateProjectRequest, ListProjectsResponse, Project, UpdateProjectRequest,
};
use uuid::Uuid;

use super::{
    access::{load_visible_project, required_text},
    error::ErrorResponse,
};
use crate::{
    AppState,
    auth::RequestContext,
    db::projects::{CreateProjectData, ProjectRepository},
    policy::{self, Actor},
};

const MAX_PROJECT_NAME_CHARS: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/{project_id}", get(get_project))
}

pub fn manager_router() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/{project_id}", patch(update_project))
}

#[instrument(name = "projects.list", skip(state, ctx), fields(user_id = %ctx.user.id))]
async fn list_projects(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<ListProjectsResponse>, ErrorResponse> {
    let projects = ProjectRepository::list_visible(state.pool(), &ctx.actor()).await?;
    Ok(Json(ListProjectsResponse { projects }))
}

#[instrument(
    name = "projects.get",
    skip(state, ctx),
    fields(project_id = %project_id, user_id = %ctx.user.id)
)]
async fn get_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, ErrorResponse> {
    let project = load_visible_project(state.pool(), &ctx.actor(), project_id).await?;
    Ok(Json(project))
}

#[instrument(name = "projects.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let actor = ctx.actor();
    let name = required_text("name", &payload.name, MAX_PROJECT_NAME_CHARS)?;
    let department_id = resolve_project_department(&actor, payload.department_id)?;

    let project = ProjectRepository::insert(
        state.pool(),
        CreateProjectData {
            name,
            description: normalize_description(payload.description),
            department_id,
            created_by: actor.user_id,
        },
    )
    .await?;

    tracing::info!(project_id = %project.id, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(
    name = "projects.update",
    skip(state, ctx, payload),
    fields(project_id = %project_id, user_id = %ctx.user.id)
)]
async fn update_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ErrorResponse> {
    let actor = ctx.actor();
    let project = load_visible_project(state.pool(), &actor, project_id).await?;

    if !policy::can_manage_project(&actor, project.department_id) {
        warn!("project update denied");
        return Err(ErrorResponse::forbidden("project not manageable"));
    }

    let name = payload
        .name
        .as_deref()
        .map(|name| required_text("name", name, MAX_PROJECT_NAME_CHARS))
        .transpose()?;
    let description = payload.description.map(normalize_description);

    let project = ProjectRepository::update(
        state.pool(),
        project_id,
        name.as_deref(),
        description.as_ref().map(|value| value.as_deref()),
    )
    .await?;

    Ok(Json(project))
}

/// Managers create projects in their own department; admins choose freely.
fn resolve_project_department(
    actor: &Actor,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, ErrorResponse> {
    let department_id = requested.or(actor.department_id);
    if !policy::can_manage_project(actor, department_id) {
        return Err(ErrorResponse::forbidden(
            "managers can only create projects in their own department",
        ));
    }
    Ok(department_id)
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use utils::api::users::Role;

    use super::*;

    #[test]
    fn manager_defaults_to_own_department() {
        let dept = Uuid::new_v4();
        let manager = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Manager,
            department_id: Some(dept),
        };
        assert_eq!(resolve_project_department(&manager, None).unwrap(), Some(dept));
        assert!(resolve_project_department(&manager, Some(Uuid::new_v4())).is_err());
    }

    #[test]
    fn admin_may_create_department_less_projects() {
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
            department_id: None,
        };
        assert_eq!(resolve_project_department(&admin, None).unwrap(), None);
    }

    #[test]
    fn blank_descriptions_become_none() {
        assert_eq!(normalize_description(Some("   ".into())), None);
        assert_eq!(
            normalize_description(Some(" Roadmap ".into())),
            Some("Roadmap".to_string())
        );
    }
}
