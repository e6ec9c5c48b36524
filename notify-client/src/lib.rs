//! notify-client library crate.
//!
//! Client-side notification pipeline: the push subscription and REST
//! snapshots are merged into a de-duplicated, capped SQLite log that the
//! inbox and badge counter read.

pub mod api;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod inbox;
pub mod logging;
pub mod notification;
pub mod session;

pub use config::ClientConfig;
pub use domain::{IdentityKey, Notification, NotificationKind, build_key};
pub use error::{Error, Result};
pub use inbox::{BadgeCounter, Inbox, InboxPage, InboxTab};
pub use notification::{ConnectionState, IngestEvent, RealtimeIngestor, SessionManager};
pub use session::Session;
