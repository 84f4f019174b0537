//! In-memory collections owned by the task engine.
//!
//! The store is deliberately dumb: plain maps plus snapshot queries, with no
//! locking and no event derivation. The engine wraps it in a lock and is the
//! only component allowed to touch it (single-writer discipline) — the
//! collections are never reachable as shared globals from other components.

use std::collections::HashMap;

use taskwire_proto::notification::{Notification, NotificationId};
use taskwire_proto::task::{Task, TaskFilter, TaskId};

/// The canonical task and notification collections.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    notifications: HashMap<NotificationId, Notification>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task.
    pub fn insert_task(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Returns a task by id.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Returns a mutable task by id.
    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Removes a task, returning it if it existed.
    pub fn remove_task(&mut self, id: &TaskId) -> Option<Task> {
        self.tasks.remove(id)
    }

    /// Returns a snapshot of tasks matching every provided filter field,
    /// sorted by creation time (ties broken by id, which is time-ordered).
    #[must_use]
    pub fn tasks_filtered(&self, filter: &TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| {
                filter.team_id.as_ref().is_none_or(|team| &t.team_id == team)
                    && filter
                        .assigned_to
                        .as_ref()
                        .is_none_or(|user| t.assigned_to.as_ref() == Some(user))
                    && filter.status.is_none_or(|status| t.status == status)
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Inserts a notification.
    pub fn insert_notification(&mut self, notification: Notification) {
        self.notifications.insert(notification.id, notification);
    }

    /// Returns a mutable notification by id.
    pub fn notification_mut(&mut self, id: &NotificationId) -> Option<&mut Notification> {
        self.notifications.get_mut(id)
    }

    /// Removes every notification originating from the given task,
    /// returning how many were removed.
    pub fn remove_notifications_for_task(&mut self, task_id: &TaskId) -> usize {
        let before = self.notifications.len();
        self.notifications
            .retain(|_, n| n.task_id.as_ref() != Some(task_id));
        before - self.notifications.len()
    }

    /// Returns a snapshot of the notifications targeting a user,
    /// most-recent-first (ties broken by id, newest first).
    #[must_use]
    pub fn notifications_for_user(&self, user_id: &str) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        notifications
    }
}
