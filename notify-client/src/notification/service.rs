//! Realtime notification ingestor.
//!
//! Owns at most one push connection for one session. The connection task
//! decodes events, hands them to the [`IngestPipeline`] and publishes its
//! state through a watch channel:
//!
//! ```text
//! Disconnected → Connecting → Connected → Closed
//!                     ↑            │
//!                     └ Reconnecting (opt-in policy only)
//! ```
//!
//! Without a reconnect policy a connection error closes the ingestor and it
//! stays `Closed` until `start` is called again.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{ConnectionState, IngestEvent};
use super::ingest::IngestPipeline;
use super::preview::{CommentPreviewEnricher, DEFAULT_COMMENT_PAGE_SIZE, PreviewCache};
use super::push::PushChannel;
use crate::api::NotificationApi;
use crate::database::NotificationRepository;
use crate::session::Session;

/// Reconnection after a connection error.
///
/// `max_attempts = 0` (the default) disables reconnection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before attempt `attempt` (1-based), doubling up to `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Settings of one ingestor.
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub cap_per_user: usize,
    pub comment_page_size: usize,
    pub reconnect: ReconnectPolicy,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            cap_per_user: 500,
            comment_page_size: DEFAULT_COMMENT_PAGE_SIZE,
            reconnect: ReconnectPolicy::default(),
            event_buffer: 256,
        }
    }
}

struct ActiveConnection {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Long-lived push subscription feeding the local store.
pub struct RealtimeIngestor {
    session: Session,
    push: Arc<dyn PushChannel>,
    api: Arc<dyn NotificationApi>,
    store: Arc<dyn NotificationRepository>,
    preview_cache: PreviewCache,
    config: IngestorConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: broadcast::Sender<IngestEvent>,
    active: Mutex<Option<ActiveConnection>>,
}

impl RealtimeIngestor {
    pub fn new(
        session: Session,
        push: Arc<dyn PushChannel>,
        api: Arc<dyn NotificationApi>,
        store: Arc<dyn NotificationRepository>,
        preview_cache: PreviewCache,
        config: IngestorConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            session,
            push,
            api,
            store,
            preview_cache,
            config,
            state_tx: Arc::new(state_tx),
            event_tx,
            active: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a connection task is currently running.
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Open the push connection.
    ///
    /// Returns `false` without side effects when a connection is already
    /// running, and `false` in `Disconnected` state when the session has no
    /// user id or token. Must be called within a tokio runtime.
    pub fn start(&self) -> bool {
        let Some(user_id) = self.session.user_id().map(str::to_string) else {
            debug!("No user id; realtime ingestor stays disconnected");
            return false;
        };
        if self.session.token().is_none() {
            debug!(user_id, "No token; realtime ingestor stays disconnected");
            return false;
        }

        let mut active = self.active.lock();
        if active
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            debug!(user_id, "Realtime ingestor already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let enricher = CommentPreviewEnricher::new(
            self.api.clone(),
            self.preview_cache.clone(),
            self.config.comment_page_size,
        );
        let pipeline = IngestPipeline::new(
            user_id.clone(),
            self.store.clone(),
            self.api.clone(),
            enricher,
            self.config.cap_per_user,
            self.event_tx.clone(),
            cancel.clone(),
        );

        let task = ConnectionTask {
            session: self.session.clone(),
            push: self.push.clone(),
            pipeline,
            reconnect: self.config.reconnect.clone(),
            state_tx: self.state_tx.clone(),
            event_tx: self.event_tx.clone(),
            cancel: cancel.clone(),
        };

        task.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(task.run());
        *active = Some(ActiveConnection { cancel, handle });

        info!(user_id, "Realtime ingestor started");
        true
    }

    /// Close the connection. Safe to call any number of times.
    ///
    /// Batches already inside a store write finish; nothing is written after
    /// that.
    pub fn stop(&self) {
        if self.close().is_some() {
            info!("Realtime ingestor stopped");
        }
    }

    /// [`stop`](Self::stop) and wait for the connection task to exit.
    pub async fn shutdown(&self) {
        let Some(handle) = self.close() else {
            return;
        };

        if let Err(e) = handle.await
            && e.is_panic()
        {
            warn!(error = %e, "Realtime ingestor task panicked");
        }
        info!("Realtime ingestor shut down");
    }

    fn close(&self) -> Option<JoinHandle<()>> {
        let active = self.active.lock().take()?;
        active.cancel.cancel();

        if self.state_tx.send_replace(ConnectionState::Closed) != ConnectionState::Closed {
            let _ = self
                .event_tx
                .send(IngestEvent::StateChanged(ConnectionState::Closed));
        }
        Some(active.handle)
    }
}

impl Drop for RealtimeIngestor {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

/// State owned by the spawned connection task.
struct ConnectionTask {
    session: Session,
    push: Arc<dyn PushChannel>,
    pipeline: IngestPipeline,
    reconnect: ReconnectPolicy,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: broadcast::Sender<IngestEvent>,
    cancel: CancellationToken,
}

enum PumpOutcome {
    Cancelled,
    /// The stream ended or failed. `connected` tells whether it got past the handshake.
    Ended {
        connected: bool,
        error: Option<crate::Error>,
    },
}

impl ConnectionTask {
    fn set_state(&self, state: ConnectionState) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.state_tx.send_replace(state) != state {
            debug!(%state, "Realtime ingestor state changed");
            let _ = self.event_tx.send(IngestEvent::StateChanged(state));
        }
    }

    async fn run(self) {
        let mut attempt = 0u32;

        loop {
            match self.pump().await {
                PumpOutcome::Cancelled => return,
                PumpOutcome::Ended { connected, error } => {
                    if connected {
                        attempt = 0;
                    }
                    let message = match error {
                        Some(e) => {
                            warn!(error = %e, "Notification stream failed");
                            e.to_string()
                        }
                        None => {
                            info!("Notification stream closed by server");
                            "stream closed by server".to_string()
                        }
                    };
                    let _ = self.event_tx.send(IngestEvent::Error { error: message });
                }
            }

            if self.cancel.is_cancelled() {
                return;
            }

            if attempt >= self.reconnect.max_attempts {
                if self.reconnect.is_enabled() {
                    warn!(
                        max_attempts = self.reconnect.max_attempts,
                        "Giving up on notification stream"
                    );
                }
                self.set_state(ConnectionState::Closed);
                return;
            }

            attempt += 1;
            let delay = self.reconnect.delay_for(attempt);
            self.set_state(ConnectionState::Reconnecting);
            let _ = self.event_tx.send(IngestEvent::Reconnecting { attempt });
            info!(attempt, ?delay, "Reconnecting notification stream");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            self.set_state(ConnectionState::Connecting);
        }
    }

    /// One connection: connect, then feed events until the stream ends.
    ///
    /// Cancellation is observed between events, never in the middle of a
    /// store write.
    async fn pump(&self) -> PumpOutcome {
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return PumpOutcome::Cancelled,
            result = self.push.connect(&self.session) => result,
        };

        let mut stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                return PumpOutcome::Ended {
                    connected: false,
                    error: Some(e),
                };
            }
        };
        self.set_state(ConnectionState::Connected);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpOutcome::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    self.pipeline.handle_event(&event).await;
                }
                Some(Err(e)) => {
                    return PumpOutcome::Ended {
                        connected: true,
                        error: Some(e),
                    };
                }
                None => {
                    return PumpOutcome::Ended {
                        connected: true,
                        error: None,
                    };
                }
            }
        }
    }
}
