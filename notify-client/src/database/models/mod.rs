//! Row models for the notification store.
//!
//! These map directly to the schema and handle the JSON-encoded columns.

pub mod notification;

pub use notification::*;
