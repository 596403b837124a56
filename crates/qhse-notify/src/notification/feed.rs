//! Caller-held notification list.

use serde::Serialize;

use super::model::Notification;

/// The host's local copy of the latest notifications.
///
/// Read and delete actions are applied here immediately, whatever the
/// remote store answers. A refresh replaces the whole list.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct NotificationFeed {
    items: Vec<Notification>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with a fresh evaluation result.
    pub fn replace(&mut self, notifications: Vec<Notification>) {
        self.items = notifications;
    }

    /// Flag a notification as read. Returns false if the id is unknown.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for notification in &mut self.items {
            notification.read = true;
        }
    }

    /// Drop a notification. Returns false if the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<Notification>> for NotificationFeed {
    fn from(items: Vec<Notification>) -> Self {
        Self { items }
    }
}
