use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    TaskComment,
    TaskStatusChanged,
    TaskArchived,
    TaskRestored,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    pub read_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Read,
    Unread,
    Archive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotificationsRequest {
    pub ids: Vec<Uuid>,
    pub action: NotificationAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateNotificationsResponse {
    pub updated: u64,
}
