//! qhse-notify library crate.
//!
//! Derives dashboard notifications for the QHSE back office (laboratory,
//! quality and HSE domains) from a polled snapshot, and fans them out to
//! in-process subscribers.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod snapshot;
pub mod utils;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use notification::{
    Notification, NotificationFeed, NotificationService, NotificationType, Rule, RuleModule,
    RulePriority, RuleTable, SideChannelOutcome,
};
pub use snapshot::{Snapshot, SnapshotProvider, SnapshotSource};
