//! Consumer-side views over the notification log.
//!
//! [`Inbox`] is the tabbed, paginated list; [`BadgeCounter`] the unread
//! count. Neither writes ingestion data; the inbox only deletes on an
//! explicit accept/reject.

mod badge;

pub use badge::BadgeCounter;

use tracing::{debug, warn};

use crate::Result;
use crate::api::NotificationApi;
use crate::database::{NotificationMatch, NotificationRepository};
use crate::domain::{IdentityKey, Notification, NotificationKind, build_key};
use crate::notification::IngestEvent;

/// Default number of entries per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Inbox tabs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum InboxTab {
    FriendRequests,
    Likes,
    Comments,
}

impl InboxTab {
    /// Tab showing `kind`. Private messages have no tab.
    pub fn of(kind: NotificationKind) -> Option<Self> {
        match kind {
            NotificationKind::FriendRequest | NotificationKind::FriendRequestResponse => {
                Some(Self::FriendRequests)
            }
            NotificationKind::PostLike | NotificationKind::CommentLike | NotificationKind::ReplyLike => {
                Some(Self::Likes)
            }
            NotificationKind::CommentReply => Some(Self::Comments),
            NotificationKind::PrivateMessage => None,
        }
    }
}

/// One page of a tab.
#[derive(Debug)]
pub struct InboxPage<'a> {
    pub tab: InboxTab,
    /// 1-based page number, clamped to the available pages.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items: Vec<&'a Notification>,
}

#[derive(Debug, Clone)]
struct Entry {
    key: IdentityKey,
    notification: Notification,
}

impl Entry {
    fn created_at(&self) -> i64 {
        self.notification.created_at.unwrap_or_default()
    }
}

/// In-memory notification list for one user, newest first.
#[derive(Debug, Clone)]
pub struct Inbox {
    user_id: String,
    page_size: usize,
    entries: Vec<Entry>,
}

impl Inbox {
    pub fn new(user_id: impl Into<String>, page_size: usize) -> Self {
        Self {
            user_id: user_id.into(),
            page_size: page_size.max(1),
            entries: Vec::new(),
        }
    }

    /// Build the inbox from the newest `limit` stored records.
    pub async fn load(
        store: &dyn NotificationRepository,
        user_id: &str,
        limit: usize,
        page_size: usize,
    ) -> Result<Self> {
        let mut inbox = Self::new(user_id, page_size);
        let stored = store.preload(user_id, limit).await?;
        inbox.apply(&stored);
        debug!(user_id, count = inbox.len(), "Inbox loaded");
        Ok(inbox)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter().map(|entry| &entry.notification)
    }

    /// Merge `notifications` by identity key. Returns the number of new entries.
    pub fn apply(&mut self, notifications: &[Notification]) -> usize {
        let mut added = 0;

        for incoming in notifications {
            let Some(key) = build_key(&self.user_id, incoming) else {
                continue;
            };

            let entry = match self.entries.iter().position(|e| e.key == key) {
                Some(idx) => {
                    let mut existing = self.entries.remove(idx);
                    existing.notification.merge_from(incoming);
                    existing
                }
                None => {
                    added += 1;
                    Entry {
                        key,
                        notification: incoming.clone(),
                    }
                }
            };

            let created_at = entry.created_at();
            let pos = self.entries.partition_point(|e| e.created_at() >= created_at);
            self.entries.insert(pos, entry);
        }

        added
    }

    /// Apply a stored batch from the ingestor; other events are ignored.
    pub fn apply_event(&mut self, event: &IngestEvent) -> usize {
        match event {
            IngestEvent::Stored { notifications, .. } => self.apply(notifications),
            _ => 0,
        }
    }

    /// All entries of `tab`, newest first.
    pub fn tab(&self, tab: InboxTab) -> Vec<&Notification> {
        self.iter()
            .filter(|n| InboxTab::of(n.kind) == Some(tab))
            .collect()
    }

    pub fn page_count(&self, tab: InboxTab) -> usize {
        self.tab(tab).len().div_ceil(self.page_size).max(1)
    }

    /// Page `page` (1-based) of `tab`. Out-of-range pages clamp to the last one.
    pub fn page(&self, tab: InboxTab, page: usize) -> InboxPage<'_> {
        let items = self.tab(tab);
        let total_items = items.len();
        let total_pages = total_items.div_ceil(self.page_size).max(1);
        let page = page.clamp(1, total_pages);

        let items = items
            .into_iter()
            .skip((page - 1) * self.page_size)
            .take(self.page_size)
            .collect();

        InboxPage {
            tab,
            page,
            total_pages,
            total_items,
            items,
        }
    }

    /// Drop friend-request entries resolved by `request_id`.
    pub fn remove_friend_request(&mut self, request_id: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let n = &entry.notification;
            !(n.kind == NotificationKind::FriendRequest
                && (n.request_id == Some(request_id) || n.friend_request_id == Some(request_id)))
        });
        before - self.entries.len()
    }

    /// Accept or reject a friend request.
    ///
    /// On success the request disappears from the store and from this inbox.
    /// On failure the error is returned and nothing local changes, so the
    /// action can be retried.
    pub async fn respond(
        &mut self,
        api: &dyn NotificationApi,
        store: &dyn NotificationRepository,
        request_id: i64,
        accept: bool,
    ) -> Result<()> {
        if let Err(e) = api.respond_friend_request(request_id, accept).await {
            warn!(request_id, accept, error = %e, "Friend request response failed");
            return Err(e);
        }

        let removed_from_store = store
            .delete_by_match(&self.user_id, NotificationMatch::friend_request(request_id))
            .await?;
        let removed_from_inbox = self.remove_friend_request(request_id);

        debug!(
            request_id,
            accept, removed_from_store, removed_from_inbox, "Friend request resolved"
        );
        Ok(())
    }
}
