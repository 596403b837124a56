//! Notification model and rule metadata.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display type of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        };
        f.pad(s)
    }
}

/// Priority attached to a rule. Descriptive only; the engine never sorts or
/// filters on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RulePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for RulePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.pad(s)
    }
}

/// Dashboard module a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleModule {
    Laboratoire,
    Qualite,
    Hse,
    General,
}

impl fmt::Display for RuleModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Laboratoire => "laboratoire",
            Self::Qualite => "qualite",
            Self::Hse => "hse",
            Self::General => "general",
        };
        f.pad(s)
    }
}

/// Content produced by a rule formatter.
///
/// The engine turns it into a [`Notification`] by stamping an id and a
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub action: Option<String>,
    pub link: Option<String>,
}

impl NotificationDraft {
    pub fn new(
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            action: None,
            link: None,
        }
    }

    /// Attach a call to action pointing at a front-end route.
    pub fn with_action(mut self, action: impl Into<String>, link: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self.link = Some(link.into());
        self
    }
}

/// A notification handed to subscribers.
///
/// `id` is generated per evaluation, so the same condition seen by two
/// polls yields two different ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Notification {
    /// Materialize a draft at `timestamp`.
    pub fn from_draft(draft: NotificationDraft, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: format!(
                "{}-{}",
                timestamp.timestamp_millis(),
                Uuid::new_v4().simple()
            ),
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            timestamp,
            read: false,
            action: draft.action,
            link: draft.link,
        }
    }

    /// The deduplication key.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.title, &self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_draft_defaults_unread() {
        let now = Utc::now();
        let draft = NotificationDraft::new(NotificationType::Warning, "Titre", "Message")
            .with_action("Voir", "/laboratoire");
        let notification = Notification::from_draft(draft, now);

        assert!(!notification.read);
        assert_eq!(notification.timestamp, now);
        assert!(
            notification
                .id
                .starts_with(&now.timestamp_millis().to_string())
        );
        assert_eq!(notification.link.as_deref(), Some("/laboratoire"));
    }

    #[test]
    fn test_ids_differ_for_same_draft() {
        let now = Utc::now();
        let draft = NotificationDraft::new(NotificationType::Info, "Titre", "Message");
        let a = Notification::from_draft(draft.clone(), now);
        let b = Notification::from_draft(draft, now);
        assert_ne!(a.id, b.id);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_serialization_shape() {
        let draft = NotificationDraft::new(NotificationType::Error, "Incident critique", "1");
        let notification = Notification::from_draft(draft, Utc::now());
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json["type"], "error");
        assert_eq!(json["read"], false);
        assert!(json.get("action").is_none());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(RulePriority::Critical > RulePriority::High);
        assert!(RulePriority::Low < RulePriority::Medium);
        assert_eq!(RulePriority::default(), RulePriority::Medium);
    }
}
