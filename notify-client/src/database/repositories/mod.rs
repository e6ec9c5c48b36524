//! Repository layer for the notification store.

pub mod notification;
pub mod notification_tx;

pub use notification::*;
pub use notification_tx::*;
