//! Session lifecycle around the realtime ingestor.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use super::preview::PreviewCache;
use super::push::{HttpPushChannel, PushChannel};
use super::service::{IngestorConfig, RealtimeIngestor};
use crate::Result;
use crate::api::{HttpNotificationApi, NotificationApi};
use crate::database::NotificationRepository;
use crate::inbox::BadgeCounter;
use crate::session::Session;

/// Builds the backend clients for a session.
pub trait BackendConnector: Send + Sync {
    fn api(&self, session: &Session) -> Result<Arc<dyn NotificationApi>>;

    fn push(&self) -> Result<Arc<dyn PushChannel>>;
}

/// [`BackendConnector`] for the HTTP backend at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout,
        }
    }
}

impl BackendConnector for HttpConnector {
    fn api(&self, session: &Session) -> Result<Arc<dyn NotificationApi>> {
        Ok(Arc::new(HttpNotificationApi::new(
            &self.base_url,
            session.clone(),
            self.request_timeout,
        )?))
    }

    fn push(&self) -> Result<Arc<dyn PushChannel>> {
        Ok(Arc::new(HttpPushChannel::new(&self.base_url)?))
    }
}

struct ActiveSession {
    ingestor: Arc<RealtimeIngestor>,
    badge_task: JoinHandle<()>,
}

/// Keeps exactly one ingestor alive for the signed-in session.
///
/// The preview cache outlives sessions; the badge counter is reset on logout.
pub struct SessionManager {
    connector: Arc<dyn BackendConnector>,
    store: Arc<dyn NotificationRepository>,
    preview_cache: PreviewCache,
    config: IngestorConfig,
    badge: Arc<BadgeCounter>,
    current: Mutex<Option<ActiveSession>>,
    /// Serializes login and logout so a slot is never replaced mid-transition.
    transition: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn BackendConnector>,
        store: Arc<dyn NotificationRepository>,
        config: IngestorConfig,
    ) -> Self {
        Self {
            connector,
            store,
            preview_cache: PreviewCache::new(),
            config,
            badge: Arc::new(BadgeCounter::new()),
            current: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn badge(&self) -> Arc<BadgeCounter> {
        self.badge.clone()
    }

    pub fn preview_cache(&self) -> &PreviewCache {
        &self.preview_cache
    }

    pub fn store(&self) -> Arc<dyn NotificationRepository> {
        self.store.clone()
    }

    /// The ingestor of the current session, if any.
    pub fn ingestor(&self) -> Option<Arc<RealtimeIngestor>> {
        self.current
            .lock()
            .as_ref()
            .map(|active| active.ingestor.clone())
    }

    /// Replace the current session and start its ingestor.
    ///
    /// Any previous ingestor is shut down first, so two connections never
    /// coexist. Returns the new ingestor, which stays `Disconnected` when the
    /// session is not authenticated. Concurrent calls are applied one at a
    /// time; the last to run owns the slot.
    pub async fn login(&self, session: Session) -> Result<Arc<RealtimeIngestor>> {
        let _transition = self.transition.lock().await;
        self.end_current().await;

        let api = self.connector.api(&session)?;
        let push = self.connector.push()?;
        let ingestor = Arc::new(RealtimeIngestor::new(
            session,
            push,
            api,
            self.store.clone(),
            self.preview_cache.clone(),
            self.config.clone(),
        ));

        let badge_task = tokio::spawn(self.badge.clone().follow(ingestor.subscribe()));
        ingestor.start();

        *self.current.lock() = Some(ActiveSession {
            ingestor: ingestor.clone(),
            badge_task,
        });

        info!(user_id = ?ingestor.session().user_id(), "Session started");
        Ok(ingestor)
    }

    /// Stop the ingestor and reset the badge. Idempotent.
    pub async fn logout(&self) {
        let _transition = self.transition.lock().await;
        if self.end_current().await {
            info!("Session ended");
        }
        self.badge.reset();
    }

    async fn end_current(&self) -> bool {
        let previous = self.current.lock().take();
        let Some(previous) = previous else {
            return false;
        };

        previous.ingestor.shutdown().await;
        previous.badge_task.abort();
        true
    }
}
