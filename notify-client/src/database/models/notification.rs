//! Notification row model.

use sqlx::FromRow;
use tracing::warn;

use crate::domain::{CommentPreview, IdentityKey, Notification, NotificationKind};
use crate::{Error, Result};

/// One row of the `notifications` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationDbModel {
    /// Identity key; primary key.
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub request_id: Option<i64>,
    pub reference_id: Option<i64>,
    pub reference_extra_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub receiver_id: Option<i64>,
    pub created_at: i64,
    pub message: Option<String>,
    pub sender_nickname: Option<String>,
    pub sender_avatar_url: Option<String>,
    pub friend_request_id: Option<i64>,
    /// JSON-encoded [`CommentPreview`].
    pub comment_preview: Option<String>,
    pub updated_at: i64,
}

impl NotificationDbModel {
    /// Build a row from a notification that already has a resolved key and
    /// creation time.
    pub fn from_domain(
        key: &IdentityKey,
        user_id: &str,
        notification: &Notification,
        created_at: i64,
        updated_at: i64,
    ) -> Result<Self> {
        let comment_preview = notification
            .comment_preview
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            id: key.as_str().to_string(),
            user_id: user_id.to_string(),
            kind: notification.kind.as_str().to_string(),
            request_id: notification.request_id,
            reference_id: notification.reference_id,
            reference_extra_id: notification.reference_extra_id,
            sender_id: notification.sender_id,
            receiver_id: notification.receiver_id,
            created_at,
            message: notification.message.clone(),
            sender_nickname: notification.sender_nickname.clone(),
            sender_avatar_url: notification.sender_avatar_url.clone(),
            friend_request_id: notification.friend_request_id,
            comment_preview,
            updated_at,
        })
    }

    /// Convert back into the domain type.
    ///
    /// A corrupt preview blob is dropped rather than failing the whole row.
    pub fn into_domain(self) -> Result<Notification> {
        let kind = NotificationKind::parse(&self.kind).ok_or_else(|| {
            Error::Database(format!("unknown notification kind '{}' in row {}", self.kind, self.id))
        })?;

        let comment_preview = self.comment_preview.as_deref().and_then(|raw| {
            serde_json::from_str::<CommentPreview>(raw)
                .inspect_err(|e| warn!(id = %self.id, error = %e, "Dropping unreadable comment preview"))
                .ok()
        });

        Ok(Notification {
            kind,
            request_id: self.request_id,
            reference_id: self.reference_id,
            reference_extra_id: self.reference_extra_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            created_at: Some(self.created_at),
            message: self.message,
            comment_preview,
            sender_nickname: self.sender_nickname,
            sender_avatar_url: self.sender_avatar_url,
            friend_request_id: self.friend_request_id,
        })
    }
}
