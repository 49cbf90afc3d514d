use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tasks::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub tasks: Vec<Task>,
}
