use std::time::Duration;

/// Event type used when the server does not name one.
pub const DEFAULT_EVENT: &str = "message";

/// A single dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the last `event:` field, if any.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream (persists across events).
    pub id: Option<String>,
    /// Reconnection time requested by the server.
    pub retry: Option<Duration>,
}

impl SseEvent {
    /// Create an unnamed event carrying `data`.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Create a named event carrying `data`.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            ..Default::default()
        }
    }

    /// The event type, falling back to `message`.
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT)
    }

    /// Whether this event uses the default (unnamed) channel.
    pub fn is_default(&self) -> bool {
        self.event_name() == DEFAULT_EVENT
    }
}
