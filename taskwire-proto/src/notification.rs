//! Notification types derived from task mutations.
//!
//! Notifications are created by the gateway's task engine as a side effect of
//! task creation or status changes, and are never mutated afterwards except
//! for the read flag. Deleting a task removes its notifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::TaskId;

/// Unique identifier for a notification, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Creates a new time-ordered notification identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `NotificationId` from an existing UUID.
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

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a notification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    /// A task was assigned to the target user.
    Assignment,
    /// The status of a task assigned to the target user changed.
    StatusChange,
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assignment => write!(f, "ASSIGNMENT"),
            Self::StatusChange => write!(f, "STATUS_CHANGE"),
        }
    }
}

/// A notification targeted at a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification identifier.
    pub id: NotificationId,
    /// Target user id.
    pub user_id: String,
    /// Human-readable message text.
    pub message: String,
    /// Why this notification exists.
    pub category: NotificationCategory,
    /// Whether the target user has read it. Defaults to unread.
    pub read: bool,
    /// Originating task, if any. A back-reference, not an ownership link.
    pub task_id: Option<TaskId>,
    /// When this notification was created (milliseconds since epoch).
    pub created_at: u64,
}
