//! Event-to-store pipeline shared by every push event shape.
//!
//! normalize → filter → pending-request lookup → preview enrichment → upsert.
//! Errors stop at the item or event they belong to; nothing here propagates
//! to the connection loop.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use sse_codec::SseEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::events::{DropReason, IngestEvent, IngestSource};
use super::preview::{CommentPreviewEnricher, PreviewOutcome};
use crate::api::{NotificationApi, PendingFriendRequest};
use crate::database::NotificationRepository;
use crate::domain::notification::is_filled;
use crate::domain::{Notification, build_key, extract_items, normalize};

/// Processes decoded push events for one signed-in user.
pub struct IngestPipeline {
    user_id: String,
    store: Arc<dyn NotificationRepository>,
    api: Arc<dyn NotificationApi>,
    enricher: CommentPreviewEnricher,
    cap_per_user: usize,
    event_tx: broadcast::Sender<IngestEvent>,
    cancel: CancellationToken,
}

impl IngestPipeline {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn NotificationRepository>,
        api: Arc<dyn NotificationApi>,
        enricher: CommentPreviewEnricher,
        cap_per_user: usize,
        event_tx: broadcast::Sender<IngestEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            api,
            enricher,
            cap_per_user,
            event_tx,
            cancel,
        }
    }

    /// Handle one push event. Returns the number of records written.
    pub async fn handle_event(&self, event: &SseEvent) -> usize {
        let Some(source) = IngestSource::from_event_name(event.event_name()) else {
            trace!(event = event.event_name(), "Ignoring push event");
            return 0;
        };

        if event.data.trim().is_empty() {
            return 0;
        }

        let payload: Value = match serde_json::from_str(&event.data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%source, error = %e, "Dropping unparseable push event");
                self.report_drop(source, DropReason::Malformed, 1);
                return 0;
            }
        };

        self.ingest_payload(source, &payload).await
    }

    /// Run a decoded payload through the pipeline.
    pub async fn ingest_payload(&self, source: IngestSource, payload: &Value) -> usize {
        let items = extract_items(payload);
        let mut drops: HashMap<DropReason, usize> = HashMap::new();
        let mut batch = Vec::with_capacity(items.len());

        for item in items {
            match normalize(item) {
                Ok(notification) => match self.rejection(&notification) {
                    Some(reason) => *drops.entry(reason).or_default() += 1,
                    None => batch.push(notification),
                },
                Err(e) => {
                    debug!(%source, error = %e, "Dropping malformed notification");
                    *drops.entry(DropReason::Malformed).or_default() += 1;
                }
            }
        }

        self.fill_from_pending(&mut batch).await;

        batch.retain(|n| {
            let unresolvable = n.kind.is_friend_request()
                && n.sender_id.is_none()
                && n.effective_request_id().is_none();
            if unresolvable {
                *drops
                    .entry(DropReason::UnresolvableFriendRequest)
                    .or_default() += 1;
                false
            } else if build_key(&self.user_id, n).is_none() {
                *drops.entry(DropReason::NoIdentity).or_default() += 1;
                false
            } else {
                true
            }
        });

        for (reason, count) in drops {
            self.report_drop(source, reason, count);
        }

        if batch.is_empty() {
            return 0;
        }

        self.enrich(&mut batch).await;
        self.store_batch(source, &batch).await
    }

    /// Filters that need only the item itself.
    fn rejection(&self, n: &Notification) -> Option<DropReason> {
        if let Some(receiver) = n.receiver_id
            && receiver.to_string() != self.user_id.trim()
        {
            return Some(DropReason::ForeignReceiver);
        }

        if n.sender_id.is_some_and(|id| id <= 0) && !is_filled(&n.sender_nickname) {
            return Some(DropReason::SystemSender);
        }

        None
    }

    /// Fill sender details of friend requests from the pending list.
    ///
    /// At most one lookup per call, and only when some friend request lacks
    /// its nickname or avatar.
    async fn fill_from_pending(&self, batch: &mut [Notification]) {
        let needs_lookup =
            |n: &Notification| n.kind.is_friend_request() && !n.has_sender_profile();
        if !batch.iter().any(needs_lookup) {
            return;
        }

        let pending = match self.api.pending_friend_requests().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Pending friend request lookup failed");
                return;
            }
        };

        for n in batch.iter_mut().filter(|n| needs_lookup(n)) {
            if let Some(found) = match_pending(&pending, n) {
                apply_pending(n, found);
            }
        }
    }

    async fn enrich(&self, batch: &mut [Notification]) {
        let lookups = batch
            .iter_mut()
            .filter(|n| n.kind.is_comment_related())
            .map(|n| async move {
                let comment_id = n.reference_id;
                (comment_id, self.enricher.ensure_preview(n).await)
            });

        for (comment_id, outcome) in join_all(lookups).await {
            match outcome {
                Ok(PreviewOutcome::Fetched) => trace!(?comment_id, "Fetched comment preview"),
                Ok(_) => {}
                Err(e) => debug!(?comment_id, error = %e, "Comment preview unavailable"),
            }
        }
    }

    async fn store_batch(&self, source: IngestSource, batch: &[Notification]) -> usize {
        if self.cancel.is_cancelled() {
            debug!(%source, "Ingestor stopped; discarding batch");
            return 0;
        }

        match self
            .store
            .upsert_batch(&self.user_id, batch, self.cap_per_user)
            .await
        {
            Ok(summary) if !summary.is_empty() => {
                let written = summary.stored.len();
                debug!(
                    %source,
                    inserted = summary.inserted,
                    merged = summary.merged,
                    trimmed = summary.trimmed,
                    "Stored notifications"
                );
                let _ = self.event_tx.send(IngestEvent::Stored {
                    source,
                    inserted: summary.inserted,
                    notifications: summary.stored.into(),
                });
                written
            }
            Ok(_) => 0,
            Err(e) => {
                warn!(%source, error = %e, "Failed to store notifications");
                0
            }
        }
    }

    fn report_drop(&self, source: IngestSource, reason: DropReason, count: usize) {
        debug!(%source, %reason, count, "Dropped notifications");
        let _ = self.event_tx.send(IngestEvent::Dropped {
            source,
            reason,
            count,
        });
    }
}

fn match_pending<'a>(
    pending: &'a [PendingFriendRequest],
    n: &Notification,
) -> Option<&'a PendingFriendRequest> {
    if let Some(request_id) = n.effective_request_id()
        && let Some(found) = pending.iter().find(|p| p.request_id == request_id)
    {
        return Some(found);
    }

    let sender_id = n.sender_id?;
    pending.iter().find(|p| p.sender_id == Some(sender_id))
}

fn apply_pending(n: &mut Notification, pending: &PendingFriendRequest) {
    n.friend_request_id = Some(pending.request_id);
    if n.sender_id.is_none() {
        n.sender_id = pending.sender_id;
    }
    if !is_filled(&n.sender_nickname) {
        n.sender_nickname.clone_from(&pending.nickname);
    }
    if !is_filled(&n.sender_avatar_url) {
        n.sender_avatar_url.clone_from(&pending.avatar_url);
    }
    if n.created_at.is_none() {
        n.created_at = pending.created_at;
    }
}
