//! REST endpoints consumed by the notification pipeline.

mod dto;
mod http;

pub use dto::{CommentNode, PendingFriendRequest, list_items, unwrap_envelope};
pub use http::{HttpNotificationApi, install_rustls_provider, subscribe_url};
pub(crate) use http::parse_base_url;

use async_trait::async_trait;

use crate::Result;

/// Backend operations used by ingestion and the inbox.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// `GET /api/friends/pending`
    async fn pending_friend_requests(&self) -> Result<Vec<PendingFriendRequest>>;

    /// `GET /api/comment/list/{post_id}?size={size}`
    async fn post_comments(&self, post_id: i64, size: usize) -> Result<Vec<CommentNode>>;

    /// `POST /api/friends/respond/{request_id}?accept={accept}`
    async fn respond_friend_request(&self, request_id: i64, accept: bool) -> Result<()>;
}
