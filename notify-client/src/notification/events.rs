//! Events emitted by the realtime ingestor.
//!
//! Subscribe through [`RealtimeIngestor::subscribe`](super::RealtimeIngestor::subscribe)
//! to follow connection state and every batch written to the store.

use std::sync::Arc;

use crate::domain::Notification;

/// Lifecycle of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No connection and none requested, or no usable session.
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before the next attempt of an opt-in reconnect policy.
    Reconnecting,
    /// Stopped explicitly or after a connection error. Never left on its own.
    Closed,
}

impl ConnectionState {
    /// A connection task is running in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }
}

/// Which event shape a batch arrived as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum IngestSource {
    /// `init`: history delivered once per connection.
    Backlog,
    /// `notification`: one pushed notification.
    Live,
    /// Unnamed `message` events.
    Generic,
}

impl IngestSource {
    /// Map an SSE event name to its source; `None` for names the pipeline ignores.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "init" => Some(Self::Backlog),
            "notification" => Some(Self::Live),
            sse_codec::DEFAULT_EVENT => Some(Self::Generic),
            _ => None,
        }
    }
}

/// Why a notification never reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// Unknown type, non-object item or unparseable event data.
    Malformed,
    /// `receiver_id` belongs to someone else.
    ForeignReceiver,
    /// Synthetic sender id without a nickname.
    SystemSender,
    /// Friend request with neither a sender nor a request id.
    UnresolvableFriendRequest,
    /// No identity key could be derived.
    NoIdentity,
}

/// Events broadcast by the ingestor.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    StateChanged(ConnectionState),
    /// A batch was committed to the store.
    Stored {
        source: IngestSource,
        /// Records created by this batch.
        inserted: usize,
        /// Post-merge state of every record the batch touched.
        notifications: Arc<[Notification]>,
    },
    Dropped {
        source: IngestSource,
        reason: DropReason,
        count: usize,
    },
    /// Waiting before reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// The connection ended with an error.
    Error { error: String },
}
