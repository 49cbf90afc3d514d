use sqlx::PgPool;
use thiserror::Error;
use utils::api::tags::Tag;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag `{0}` already exists")]
    Conflict(String),
    #[error("unknown tag ids")]
    UnknownTag,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct TagRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TagRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Tag>, TagError> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, name, color, created_by, created_at FROM tags ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(tags)
    }

    pub async fn for_task(&self, task_id: Uuid) -> Result<Vec<Tag>, TagError> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT tg.id, tg.name, tg.color, tg.created_by, tg.created_at
            FROM task_tags tt
            JOIN tags tg ON tg.id = tt.tag_id
            WHERE tt.task_id = $1
            ORDER BY tg.name ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(self.pool)
        .await?;
        Ok(tags)
    }

    pub async fn create(&self, name: &str, color: &str, created_by: Uuid) -> Result<Tag, TagError> {
        sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (name, color, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, name, color, created_by, created_at
            "#,
        )
        .bind(name)
        .bind(color)
        .bind(created_by)
        .fetch_one(self.pool)
        .await
        .map_err(|error| {
            if super::violated_constraint(&error) == Some("tags_name_key") {
                return TagError::Conflict(name.to_string());
            }
            TagError::from(error)
        })
    }

    /// Replaces the tag set of a task; every id must exist.
    pub async fn replace_for_task(
        &self,
        task_id: Uuid,
        tag_ids: &[Uuid],
    ) -> Result<Vec<Tag>, TagError> {
        let mut unique = tag_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut tx = self.pool.begin().await?;

        let known = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
            .bind(&unique)
            .fetch_one(&mut *tx)
            .await?;
        if known != unique.len() as i64 {
            return Err(TagError::UnknownTag);
        }

        sqlx::query("DELETE FROM task_tags WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO task_tags (task_id, tag_id)
            SELECT $1, tag_id FROM UNNEST($2::uuid[]) AS tag_id
            "#,
        )
        .bind(task_id)
        .bind(&unique)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.for_task(task_id).await
    }
}
