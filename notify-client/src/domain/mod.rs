//! Domain layer: the canonical notification model and its identity.

pub mod identity;
pub mod notification;
pub mod wire;

pub use identity::{IdentityKey, build_key};
pub use notification::{CommentPreview, Notification, NotificationKind, Subject};
pub use wire::{extract_items, normalize, parse_timestamp};
