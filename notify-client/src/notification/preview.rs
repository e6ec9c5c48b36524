//! Comment preview enrichment.
//!
//! Comment notifications only carry ids. The enricher resolves the comment
//! text once per comment id and attaches it as `_commentPreview`, so the
//! inbox can render a snippet without another round trip.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::api::{CommentNode, NotificationApi};
use crate::domain::{CommentPreview, Notification};
use crate::{Error, Result};

/// Default `size` for comment list lookups.
pub const DEFAULT_COMMENT_PAGE_SIZE: usize = 100;

/// Process-wide preview cache keyed by comment id.
///
/// Cloning shares the same map. Entries are never evicted. A failed lookup
/// leaves its cell empty so a later notification retries it.
#[derive(Clone, Default)]
pub struct PreviewCache {
    entries: Arc<DashMap<i64, Arc<OnceCell<CommentPreview>>>>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, comment_id: i64) -> Option<CommentPreview> {
        self.entries
            .get(&comment_id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of resolved previews.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, comment_id: i64) -> Arc<OnceCell<CommentPreview>> {
        self.entries.entry(comment_id).or_default().clone()
    }
}

/// What [`CommentPreviewEnricher::ensure_preview`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewOutcome {
    /// The notification has no comment/post pair.
    Skipped,
    /// Served from the cache.
    Cached,
    /// Looked up through the comment list endpoint.
    Fetched,
}

/// Attaches comment previews to comment notifications.
#[derive(Clone)]
pub struct CommentPreviewEnricher {
    api: Arc<dyn NotificationApi>,
    cache: PreviewCache,
    page_size: usize,
}

impl CommentPreviewEnricher {
    pub fn new(api: Arc<dyn NotificationApi>, cache: PreviewCache, page_size: usize) -> Self {
        Self {
            api,
            cache,
            page_size,
        }
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    /// Attach the preview of the comment `notification` points at.
    ///
    /// Concurrent calls for the same comment share one lookup. On error the
    /// notification is left untouched.
    pub async fn ensure_preview(&self, notification: &mut Notification) -> Result<PreviewOutcome> {
        let (Some(comment_id), Some(post_id)) =
            (notification.reference_id, notification.reference_extra_id)
        else {
            return Ok(PreviewOutcome::Skipped);
        };

        let cell = self.cache.cell(comment_id);
        if let Some(preview) = cell.get() {
            notification.comment_preview = Some(preview.clone());
            return Ok(PreviewOutcome::Cached);
        }

        let fetched = AtomicBool::new(false);
        let fetched_ref = &fetched;
        let preview = cell
            .get_or_try_init(|| async move {
                fetched_ref.store(true, Ordering::Relaxed);
                self.lookup(post_id, comment_id).await
            })
            .await?;

        notification.comment_preview = Some(preview.clone());
        Ok(if fetched.load(Ordering::Relaxed) {
            PreviewOutcome::Fetched
        } else {
            PreviewOutcome::Cached
        })
    }

    async fn lookup(&self, post_id: i64, comment_id: i64) -> Result<CommentPreview> {
        let comments = self.api.post_comments(post_id, self.page_size).await?;
        let preview = CommentNode::find(&comments, comment_id)
            .map(|comment| comment.to_preview(post_id))
            .ok_or_else(|| Error::not_found("Comment", comment_id.to_string()))?;

        debug!(post_id, comment_id, "Resolved comment preview");
        Ok(preview)
    }
}
