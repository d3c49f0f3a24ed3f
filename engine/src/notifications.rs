//! User-facing scheduler notifications.
//!
//! The host decides how to surface these (on-screen toast, sound, log line).
//! The engine only queues them; the embedder drains the queue once per frame
//! through [`SchedulerRuntime::take_notifications`](crate::SchedulerRuntime::take_notifications).

use strand_types::GroupKind;

/// A scheduler event worth showing to the player.
///
/// This is a closed enum - only the engine constructs these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerNotification {
    /// A task was registered.
    Loaded { module: String, group: GroupKind },
    /// A task was removed (explicitly, by bulk removal, or after a fault).
    Removed { module: String, group: GroupKind },
    /// Bulk removal emptied a group that had tasks.
    GroupEmptied { group: GroupKind, removed: usize },
    /// A task faulted and was contained.
    TaskFaulted { module: String, message: String },
}

impl SchedulerNotification {
    /// Format the notification as a short human-readable line.
    #[must_use]
    pub fn format(&self) -> String {
        match self {
            Self::Loaded { module, .. } => format!("Loaded '{module}'"),
            Self::Removed { module, .. } => format!("Removed '{module}'"),
            Self::GroupEmptied { group, removed } => {
                format!("Removed {removed} task(s) from the {group} group")
            }
            Self::TaskFaulted { module, message } => {
                format!("'{module}' crashed: {message}")
            }
        }
    }
}

/// Pending notifications, in the order they were raised.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Vec<SchedulerNotification>,
}

impl NotificationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: SchedulerNotification) {
        self.pending.push(notification);
    }

    /// Take all pending notifications, clearing the queue.
    pub fn take(&mut self) -> Vec<SchedulerNotification> {
        std::mem::take(&mut self.pending)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
