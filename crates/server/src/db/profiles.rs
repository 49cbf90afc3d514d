use sqlx::PgPool;
use thiserror::Error;
use utils::api::users::{Profile, Role};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("user not found")]
    NotFound,
    #[error("department not found")]
    UnknownDepartment,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

const PROFILE_COLUMNS: &str =
    "id, email, display_name, role, department_id, created_at, updated_at";

pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch(&self, user_id: Uuid) -> Result<Profile, ProfileError> {
        self.find(user_id).await?.ok_or(ProfileError::NotFound)
    }

    pub async fn find(&self, user_id: Uuid) -> Result<Option<Profile>, ProfileError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(profile)
    }

    /// Lists users, restricted to one department when `department_id` is set.
    pub async fn list(&self, department_id: Option<Uuid>) -> Result<Vec<Profile>, ProfileError> {
        let profiles = sqlx::query_as::<_, Profile>(&format!(
            r#"
            SELECT {PROFILE_COLUMNS}
            FROM profiles
            WHERE ($1::uuid IS NULL OR department_id = $1)
            ORDER BY email ASC
            "#
        ))
        .bind(department_id)
        .fetch_all(self.pool)
        .await?;
        Ok(profiles)
    }

    /// Updates role and/or department. `department_id` follows the
    /// absent / clear / set convention of `Option<Option<_>>`.
    pub async fn update(
        &self,
        user_id: Uuid,
        role: Option<Role>,
        department_id: Option<Option<Uuid>>,
    ) -> Result<Profile, ProfileError> {
        let (set_department, department_value) = match department_id {
            None => (false, None),
            Some(value) => (true, value),
        };

        sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE profiles AS p
            SET role          = COALESCE($2, p.role),
                department_id = CASE WHEN $3 THEN $4 ELSE p.department_id END,
                updated_at    = NOW()
            WHERE p.id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(role)
        .bind(set_department)
        .bind(department_value)
        .fetch_optional(self.pool)
        .await
        .map_err(|error| {
            if super::violated_constraint(&error) == Some("profiles_department_id_fkey") {
                return ProfileError::UnknownDepartment;
            }
            ProfileError::from(error)
        })?
        .ok_or(ProfileError::NotFound)
    }
}
