//! Realtime notification ingestion.
//!
//! A [`RealtimeIngestor`] keeps the push subscription open, routes every
//! event through the [`IngestPipeline`] into the local store, and
//! broadcasts [`IngestEvent`]s to consumers. [`SessionManager`] ties one
//! ingestor to the signed-in session.

pub mod events;
pub mod ingest;
pub mod manager;
pub mod preview;
pub mod push;
pub mod service;

pub use events::{ConnectionState, DropReason, IngestEvent, IngestSource};
pub use ingest::IngestPipeline;
pub use manager::{BackendConnector, HttpConnector, SessionManager};
pub use preview::{CommentPreviewEnricher, PreviewCache, PreviewOutcome};
pub use push::{EventStream, HttpPushChannel, PushChannel};
pub use service::{IngestorConfig, RealtimeIngestor, ReconnectPolicy};
