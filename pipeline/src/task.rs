use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a follow-up task. The only legal transitions are
/// `Open -> Done` and `Done -> Open` (explicit reopen).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Open => write!(f, "open"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

/// Allow casting TaskStatus from strings.
impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "done" => Ok(TaskStatus::Done),
            invalid => Err(ParseTaskStatusError(invalid.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid TaskStatus")]
pub struct ParseTaskStatusError(String);

/// A scheduled follow-up action tied to a lead.
///
/// "Due" is never tracked by a timer; it is computed lazily by comparing
/// `due_at` against the current time at read time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FollowUpTask {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub owner: String,
    pub label: String,
    pub due_at: DateTime<Utc>,
    pub status: TaskStatus,
}

/// A task ready for insertion. Tasks are always created `Open`.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub lead_id: Uuid,
    pub owner: String,
    pub label: String,
    pub due_at: DateTime<Utc>,
}
