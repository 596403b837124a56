//! Notification engine.
//!
//! Evaluates a table of rules against the dashboard snapshot and publishes
//! the resulting notifications to in-process subscribers, either on demand
//! or on a fixed polling interval.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use qhse_notify::{EngineConfig, NotificationService};
//!
//! let service = Arc::new(NotificationService::from_config(&EngineConfig::from_env()?)?);
//! let subscription = service.subscribe(|notifications| {
//!     for n in notifications {
//!         println!("[{}] {}: {}", n.kind, n.title, n.message);
//!     }
//! });
//! service.start_polling(Duration::from_secs(30))?;
//! ```

mod feed;
mod model;
pub mod rules;
mod service;
pub mod store;

pub use feed::NotificationFeed;
pub use model::{Notification, NotificationDraft, NotificationType, RuleModule, RulePriority};
pub use rules::{Rule, RuleInfo, RuleTable, default_rules};
pub use service::{NotificationCallback, NotificationService, Subscription};
pub use store::{
    HttpNotificationStore, NoopNotificationStore, RemoteNotificationStore, SideChannelOutcome,
};
