use sqlx::PgPool;
use thiserror::Error;
use utils::api::projects::Project;
use uuid::Uuid;

use crate::policy::Actor;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project not found")]
    NotFound,
    #[error("department not found")]
    UnknownDepartment,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct CreateProjectData {
    pub name: String,
    pub description: Option<String>,
    pub department_id: Option<Uuid>,
    pub created_by: Uuid,
}

const PROJECT_COLUMNS: &str =
    "id, name, description, department_id, created_by, created_at, updated_at";

pub struct ProjectRepository;

impl ProjectRepository {
    pub async fn fetch_by_id(
        pool: &PgPool,
        project_id: Uuid,
    ) -> Result<Option<Project>, ProjectError> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(project_id)
        .fetch_optional(pool)
        .await?;
        Ok(project)
    }

    /// Projects visible to `actor`: everything for admins, otherwise the
    /// actor's department plus department-less projects.
    pub async fn list_visible(pool: &PgPool, actor: &Actor) -> Result<Vec<Project>, ProjectError> {
        let projects = sqlx::query_as::<_, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS}
            FROM projects
            WHERE $1
               OR department_id IS NULL
               OR department_id = $2
            ORDER BY name ASC
            "#
        ))
        .bind(actor.is_admin())
        .bind(actor.department_id)
        .fetch_all(pool)
        .await?;
        Ok(projects)
    }

    pub async fn insert(pool: &PgPool, data: CreateProjectData) -> Result<Project, ProjectError> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (name, description, department_id, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.department_id)
        .bind(data.created_by)
        .fetch_one(pool)
        .await
        .map_err(|error| {
            if super::violated_constraint(&error) == Some("projects_department_id_fkey") {
                return ProjectError::UnknownDepartment;
            }
            ProjectError::from(error)
        })
    }

    pub async fn update(
        pool: &PgPool,
        project_id: Uuid,
        name: Option<&str>,
        description: Option<Option<&str>>,
    ) -> Result<Project, ProjectError> {
        let (set_description, description_value) = match description {
            None => (false, None),
            Some(value) => (true, value),
        };

        sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects AS p
            SET name        = COALESCE($2, p.name),
                description = CASE WHEN $3 THEN $4 ELSE p.description END,
                updated_at  = NOW()
            WHERE p.id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(name)
        .bind(set_description)
        .bind(description_value)
        .fetch_optional(pool)
        .await?
        .ok_or(ProjectError::NotFound)
    }
}
