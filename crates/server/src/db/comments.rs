use sqlx::PgPool;
use thiserror::Error;
use utils::api::comments::Comment;
use uuid::Uuid;

pub const MAX_COMMENT_BYTES: usize = 10_000;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("comment not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

const COMMENT_COLUMNS: &str = "id, task_id, author_id, body, created_at, updated_at";

pub struct CommentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CommentRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Comment>, CommentError> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE task_id = $1 ORDER BY created_at ASC"
        ))
        .bind(task_id)
        .fetch_all(self.pool)
        .await?;
        Ok(comments)
    }

    pub async fn find(&self, comment_id: Uuid) -> Result<Option<Comment>, CommentError> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(comment_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(comment)
    }

    pub async fn create(
        &self,
        task_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> Result<Comment, CommentError> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            r#"
            INSERT INTO comments (task_id, author_id, body)
            VALUES ($1, $2, $3)
            RETURNING {COMMENT_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(author_id)
        .bind(body)
        .fetch_one(self.pool)
        .await?;
        Ok(comment)
    }

    pub async fn delete(&self, comment_id: Uuid) -> Result<(), CommentError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CommentError::NotFound);
        }
        Ok(())
    }
}
