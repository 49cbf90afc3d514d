use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::db::{
    assignments::AssignmentError, comments::CommentError, departments::DepartmentError,
    notifications::NotificationError, profiles::ProfileError, projects::ProjectError,
    tags::TagError, tasks::TaskError,
};

/// JSON error body: `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn database_error(error: &sqlx::Error, what: &str) -> ErrorResponse {
    tracing::error!(?error, "database error while handling {what}");
    ErrorResponse::internal()
}

impl From<TaskError> for ErrorResponse {
    fn from(error: TaskError) -> Self {
        match error {
            TaskError::NotFound => ErrorResponse::not_found("task not found"),
            TaskError::AlreadyArchived => ErrorResponse::conflict("task is already archived"),
            TaskError::NotArchived => ErrorResponse::conflict("task is not archived"),
            TaskError::Archived => ErrorResponse::conflict("archived tasks cannot be changed"),
            TaskError::ParentArchived => ErrorResponse::conflict("parent task is archived"),
            TaskError::InvalidSchedule => {
                ErrorResponse::bad_request("start_at must not be after due_at")
            }
            TaskError::PayloadTooLarge => ErrorResponse::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "task title and description are too large",
            ),
            TaskError::Database(error) => database_error(&error, "task"),
        }
    }
}

impl From<AssignmentError> for ErrorResponse {
    fn from(error: AssignmentError) -> Self {
        match error {
            AssignmentError::AlreadyAssigned => {
                ErrorResponse::conflict("user is already assigned to this task")
            }
            AssignmentError::NotFound => ErrorResponse::not_found("assignment not found"),
            AssignmentError::Database(error) => database_error(&error, "assignment"),
        }
    }
}

impl From<CommentError> for ErrorResponse {
    fn from(error: CommentError) -> Self {
        match error {
            CommentError::NotFound => ErrorResponse::not_found("comment not found"),
            CommentError::Database(error) => database_error(&error, "comment"),
        }
    }
}

impl From<TagError> for ErrorResponse {
    fn from(error: TagError) -> Self {
        match error {
            TagError::Conflict(name) => {
                ErrorResponse::conflict(format!("tag `{name}` already exists"))
            }
            TagError::UnknownTag => ErrorResponse::bad_request("unknown tag ids"),
            TagError::Database(error) => database_error(&error, "tag"),
        }
    }
}

impl From<NotificationError> for ErrorResponse {
    fn from(error: NotificationError) -> Self {
        match error {
            NotificationError::Database(error) => database_error(&error, "notification"),
        }
    }
}

impl From<ProjectError> for ErrorResponse {
    fn from(error: ProjectError) -> Self {
        match error {
            ProjectError::NotFound => ErrorResponse::not_found("project not found"),
            ProjectError::UnknownDepartment => ErrorResponse::bad_request("department not found"),
            ProjectError::Database(error) => database_error(&error, "project"),
        }
    }
}

impl From<ProfileError> for ErrorResponse {
    fn from(error: ProfileError) -> Self {
        match error {
            ProfileError::NotFound => ErrorResponse::not_found("user not found"),
            ProfileError::UnknownDepartment => ErrorResponse::bad_request("department not found"),
            ProfileError::Database(error) => database_error(&error, "user"),
        }
    }
}

impl From<DepartmentError> for ErrorResponse {
    fn from(error: DepartmentError) -> Self {
        match error {
            DepartmentError::Conflict(name) => {
                ErrorResponse::conflict(format!("department `{name}` already exists"))
            }
            DepartmentError::Database(error) => database_error(&error, "department"),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[tokio::test]
    async fn renders_json_error_body() {
        let response = ErrorResponse::forbidden("nope").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "error": "nope" }));
    }

    #[test]
    fn archive_state_errors_are_conflicts() {
        assert_eq!(
            ErrorResponse::from(TaskError::AlreadyArchived).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorResponse::from(TaskError::NotArchived).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorResponse::from(TaskError::ParentArchived).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn validation_errors_map_to_client_statuses() {
        assert_eq!(
            ErrorResponse::from(TaskError::InvalidSchedule).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorResponse::from(TaskError::PayloadTooLarge).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ErrorResponse::from(TagError::UnknownTag).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorResponse::from(TaskError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn database_failures_are_internal() {
        let response = ErrorResponse::from(TaskError::Database(sqlx::Error::RowNotFound));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.message(), "internal server error");
    }
}
