use sqlx::PgPool;
use thiserror::Error;
use utils::api::users::Department;

#[derive(Debug, Error)]
pub enum DepartmentError {
    #[error("department `{0}` already exists")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct DepartmentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DepartmentRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Department>, DepartmentError> {
        let departments = sqlx::query_as::<_, Department>(
            "SELECT id, name, created_at FROM departments ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(departments)
    }

    pub async fn create(&self, name: &str) -> Result<Department, DepartmentError> {
        sqlx::query_as::<_, Department>(
            r#"
            INSERT INTO departments (name)
            VALUES ($1)
            RETURNING id, name, created_at
            "#,
        )
        .bind(name)
        .fetch_one(self.pool)
        .await
        .map_err(|error| {
            if super::violated_constraint(&error) == Some("departments_name_key") {
                return DepartmentError::Conflict(name.to_string());
            }
            DepartmentError::from(error)
        })
    }
}
