//! Task domain types shared between the gateway and its clients.
//!
//! The same shapes serve as query/mutation payloads on the HTTP surface and
//! as event payloads on the streaming surface, so a subscriber receives tasks
//! in exactly the schema a query would return them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TITLE_LENGTH: usize = 256;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a task.
///
/// Wire encoding uses the upper-case tokens (`"TODO"`, `"IN_PROGRESS"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task is open and not started.
    Todo,
    /// Task is actively being worked on.
    InProgress,
    /// Task is awaiting review.
    Review,
    /// Task has been completed.
    Completed,
    /// Task has been cancelled.
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "TODO"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Review => write!(f, "REVIEW"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    /// Can wait.
    Low,
    /// Default urgency.
    Medium,
    /// Should be picked up soon.
    High,
    /// Drop everything.
    Urgent,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Urgent => write!(f, "URGENT"),
        }
    }
}

/// A task as stored by the gateway and returned to clients.
///
/// `team_id` and `created_by` are immutable after creation; `updated_at`
/// is refreshed on every mutation. Timestamps are milliseconds since epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier (UUID v7, time-ordered).
    pub id: TaskId,
    /// Task title (non-empty, at most [`MAX_TITLE_LENGTH`] characters).
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Current priority.
    pub priority: TaskPriority,
    /// Optional assignee user id.
    pub assigned_to: Option<String>,
    /// Owning team id. Immutable after creation.
    pub team_id: String,
    /// User id of the creator. Immutable.
    pub created_by: String,
    /// Optional due date (milliseconds since epoch).
    pub due_date: Option<u64>,
    /// When this task was created (milliseconds since epoch).
    pub created_at: u64,
    /// When this task was last mutated (milliseconds since epoch).
    pub updated_at: u64,
}

/// Input for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskInput {
    /// Task title (required, non-empty).
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Priority (required).
    pub priority: TaskPriority,
    /// Owning team id (required).
    pub team_id: String,
    /// Optional assignee user id.
    pub assigned_to: Option<String>,
    /// Optional due date (milliseconds since epoch).
    pub due_date: Option<u64>,
}

/// Partial update of a task. Only fields present in the patch are applied;
/// omitted fields keep their current values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New priority.
    pub priority: Option<TaskPriority>,
    /// New assignee user id.
    pub assigned_to: Option<String>,
    /// New due date (milliseconds since epoch).
    pub due_date: Option<u64>,
}

/// Conjunctive task listing filter. Omitted fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskFilter {
    /// Restrict to a single team.
    pub team_id: Option<String>,
    /// Restrict to a single assignee.
    pub assigned_to: Option<String>,
    /// Restrict to a single status.
    pub status: Option<TaskStatus>,
}
