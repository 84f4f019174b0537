//! Task mutation engine: single-writer task/notification state plus event
//! derivation.
//!
//! The engine is the only component that mutates the task and notification
//! collections. Every mutation runs under the write lock for its full
//! duration — including the publishes it derives — so two concurrent
//! mutations can never interleave, and published events always reflect a
//! consistent snapshot. Reads share the read lock and run concurrently with
//! each other.
//!
//! Event ordering within one mutation is fixed: the data event
//! (`task-created`/`task-updated`/`task-deleted`) is published first, then
//! any derived notifications. Publish failures are absorbed by the bus and
//! never roll back the committed mutation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;

use taskwire_proto::error::ErrorKind;
use taskwire_proto::notification::{Notification, NotificationCategory, NotificationId};
use taskwire_proto::stream::EventPayload;
use taskwire_proto::task::{
    CreateTaskInput, MAX_TITLE_LENGTH, Task, TaskFilter, TaskId, TaskPatch, TaskStatus,
};
use taskwire_proto::topic::Topic;

use crate::bus::EventBus;
use crate::directory::UserDirectory;
use crate::store::TaskStore;

/// Errors that can occur during task operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {MAX_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// Team id is required and cannot be empty.
    #[error("team id is required")]
    TeamMissing,
    /// Task with the given ID was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

impl TaskError {
    /// The stable error kind surfaced to clients.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TitleEmpty | Self::TitleTooLong | Self::TeamMissing => ErrorKind::InvalidInput,
            Self::TaskNotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Owns the canonical in-memory task and notification collections and
/// publishes the events each mutation derives.
pub struct TaskEngine {
    state: RwLock<TaskStore>,
    bus: Arc<EventBus>,
    directory: Arc<dyn UserDirectory>,
}

impl TaskEngine {
    /// Creates an engine with empty collections.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            state: RwLock::new(TaskStore::new()),
            bus,
            directory,
        }
    }

    /// Returns the current timestamp in milliseconds since epoch.
    fn now_ms() -> u64 {
        u64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(u64::MAX)
    }

    /// Resolves a user id to a display name, falling back to the raw id.
    fn display_name(&self, user_id: &str) -> String {
        self.directory
            .find_user(user_id)
            .map_or_else(|| user_id.to_string(), |u| u.name)
    }

    /// Creates a new task owned by `creator`.
    ///
    /// Publishes the task on `task-created:<team>`. When the input assigns
    /// the task to someone other than the creator, an assignment
    /// notification is stored and published on `notification:<assignee>`
    /// after the data event.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`], [`TaskError::TitleTooLong`], or
    /// [`TaskError::TeamMissing`] when validation fails.
    pub async fn create_task(
        &self,
        input: CreateTaskInput,
        creator: &str,
    ) -> Result<Task, TaskError> {
        validate_title(&input.title)?;
        if input.team_id.is_empty() {
            return Err(TaskError::TeamMissing);
        }

        let now = Self::now_ms();
        let task = Task {
            id: TaskId::new(),
            title: input.title,
            description: input.description,
            status: TaskStatus::Todo,
            priority: input.priority,
            assigned_to: input.assigned_to,
            team_id: input.team_id,
            created_by: creator.to_string(),
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.insert_task(task.clone());
        tracing::info!(task = %task.id, team = %task.team_id, "task created");

        self.bus
            .publish(
                &Topic::TaskCreated(task.team_id.clone()).to_string(),
                EventPayload::Task { task: task.clone() },
            )
            .await;

        if let Some(assignee) = task.assigned_to.clone()
            && assignee != creator
        {
            let message = format!(
                "{} assigned you \"{}\"",
                self.display_name(creator),
                task.title
            );
            self.notify(
                &mut state,
                &assignee,
                message,
                NotificationCategory::Assignment,
                task.id,
                now,
            )
            .await;
        }
        drop(state);

        Ok(task)
    }

    /// Applies a partial update to a task on behalf of `actor`.
    ///
    /// Only fields present in the patch are applied; `updated_at` is
    /// refreshed. Publishes the updated task on `task-updated:<team>`,
    /// then derived notifications in a fixed order: an assignment
    /// notification when the patch hands the task to a new assignee other
    /// than the actor, then a status-change notification when the patch
    /// changed the status and the task (post-patch) has an assignee.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown id, or a
    /// validation error when the patch carries an invalid title.
    pub async fn update_task(
        &self,
        id: TaskId,
        patch: TaskPatch,
        actor: &str,
    ) -> Result<Task, TaskError> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }

        let now = Self::now_ms();
        let mut state = self.state.write().await;
        let task = state.task_mut(&id).ok_or(TaskError::TaskNotFound(id))?;

        let prev_status = task.status;
        let prev_assignee = task.assigned_to.clone();

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(assigned_to) = patch.assigned_to {
            task.assigned_to = Some(assigned_to);
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }
        task.updated_at = now;
        let task = task.clone();
        tracing::info!(task = %task.id, team = %task.team_id, "task updated");

        self.bus
            .publish(
                &Topic::TaskUpdated(task.team_id.clone()).to_string(),
                EventPayload::Task { task: task.clone() },
            )
            .await;

        if let Some(assignee) = task.assigned_to.clone() {
            let assignee_changed = prev_assignee.as_deref() != Some(assignee.as_str());
            if assignee_changed && assignee != actor {
                let message = format!(
                    "{} assigned you \"{}\"",
                    self.display_name(actor),
                    task.title
                );
                self.notify(
                    &mut state,
                    &assignee,
                    message,
                    NotificationCategory::Assignment,
                    task.id,
                    now,
                )
                .await;
            }
            if task.status != prev_status {
                let message = format!("\"{}\" moved to {}", task.title, task.status);
                self.notify(
                    &mut state,
                    &assignee,
                    message,
                    NotificationCategory::StatusChange,
                    task.id,
                    now,
                )
                .await;
            }
        }
        drop(state);

        Ok(task)
    }

    /// Deletes a task. Idempotent: returns `false` for an unknown id.
    ///
    /// On success removes the task, cascades removal of its notifications,
    /// and publishes the task id on `task-deleted:<team>`.
    pub async fn delete_task(&self, id: TaskId) -> bool {
        let mut state = self.state.write().await;
        let Some(task) = state.remove_task(&id) else {
            return false;
        };
        let removed = state.remove_notifications_for_task(&id);
        tracing::info!(
            task = %id,
            team = %task.team_id,
            notifications_removed = removed,
            "task deleted"
        );

        self.bus
            .publish(
                &Topic::TaskDeleted(task.team_id.clone()).to_string(),
                EventPayload::TaskDeleted { task_id: id },
            )
            .await;
        drop(state);

        true
    }

    /// Returns a task by id.
    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        let state = self.state.read().await;
        state.task(&id).cloned()
    }

    /// Returns a snapshot of tasks matching the filter, sorted by creation
    /// time.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let state = self.state.read().await;
        state.tasks_filtered(filter)
    }

    /// Returns a user's notifications, most-recent-first.
    pub async fn list_notifications(&self, user_id: &str) -> Vec<Notification> {
        let state = self.state.read().await;
        state.notifications_for_user(user_id)
    }

    /// Marks a notification as read. Returns `false` for an unknown id.
    pub async fn mark_notification_read(&self, id: NotificationId) -> bool {
        let mut state = self.state.write().await;
        match state.notification_mut(&id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    /// Stores a notification and publishes it on the target user's
    /// notification topic.
    async fn notify(
        &self,
        state: &mut TaskStore,
        user_id: &str,
        message: String,
        category: NotificationCategory,
        task_id: TaskId,
        now: u64,
    ) {
        let notification = Notification {
            id: NotificationId::new(),
            user_id: user_id.to_string(),
            message,
            category,
            read: false,
            task_id: Some(task_id),
            created_at: now,
        };
        state.insert_notification(notification.clone());
        tracing::debug!(
            user = %user_id,
            category = %category,
            task = %task_id,
            "notification created"
        );

        self.bus
            .publish(
                &Topic::Notification(user_id.to_string()).to_string(),
                EventPayload::Notification { notification },
            )
            .await;
    }
}

/// Validates a task title against the length rules.
fn validate_title(title: &str) -> Result<(), TaskError> {
    if title.is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(TaskError::TitleTooLong);
    }
    Ok(())
}
