//! Notification entity and its kinds.

use serde::{Deserialize, Serialize};

/// Kind of a user-facing notification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    FriendRequest,
    FriendRequestResponse,
    PostLike,
    CommentLike,
    CommentReply,
    ReplyLike,
    PrivateMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Parse a wire value, ignoring case and `_`/`-`/`.`/space separators.
    ///
    /// `friend_request`, `friendRequest` and `FRIEND-REQUEST` all resolve to
    /// [`NotificationKind::FriendRequest`].
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = compact_key(input);
        if normalized.is_empty() {
            return None;
        }

        <Self as strum::IntoEnumIterator>::iter().find(|kind| compact_key(kind.as_str()) == normalized)
    }

    /// Like toggles, keyed per sender and target.
    pub fn is_like(&self) -> bool {
        matches!(self, Self::PostLike | Self::CommentLike | Self::ReplyLike)
    }

    /// Kinds whose `reference_id` points at a comment and may carry a preview.
    pub fn is_comment_related(&self) -> bool {
        matches!(self, Self::CommentLike | Self::CommentReply | Self::ReplyLike)
    }

    pub fn is_friend_request(&self) -> bool {
        matches!(self, Self::FriendRequest)
    }
}

fn compact_key(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Lightweight preview of the comment a notification refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPreview {
    pub post_id: i64,
    pub comment_id: i64,
    /// Raw comment text; consumers clip it for display.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_title: Option<String>,
}

impl CommentPreview {
    /// Content clipped to `max_chars` characters, with an ellipsis when cut.
    pub fn clipped(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }
}

/// Tagged view over the kind-dependent identifiers of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    FriendRequest {
        request_id: Option<i64>,
        sender_id: Option<i64>,
    },
    Like {
        target_id: Option<i64>,
        sender_id: Option<i64>,
    },
    Comment {
        comment_id: Option<i64>,
        post_id: Option<i64>,
    },
    Message {
        reference_id: Option<i64>,
    },
}

/// A single user-facing notification in canonical form.
///
/// Field names on the wire follow the backend's camelCase; enrichment fields
/// are attached on the client and carry a leading underscore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_extra_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<i64>,
    /// Unix epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "_commentPreview",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub comment_preview: Option<CommentPreview>,
    #[serde(
        rename = "_senderNickname",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sender_nickname: Option<String>,
    #[serde(
        rename = "_senderAvatarUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sender_avatar_url: Option<String>,
    #[serde(
        rename = "_friendRequestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub friend_request_id: Option<i64>,
}

impl Notification {
    /// Create an empty notification of the given kind.
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            request_id: None,
            reference_id: None,
            reference_extra_id: None,
            sender_id: None,
            receiver_id: None,
            created_at: None,
            message: None,
            comment_preview: None,
            sender_nickname: None,
            sender_avatar_url: None,
            friend_request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: i64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_reference(mut self, reference_id: i64, extra_id: Option<i64>) -> Self {
        self.reference_id = Some(reference_id);
        self.reference_extra_id = extra_id;
        self
    }

    pub fn with_sender(mut self, sender_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn with_receiver(mut self, receiver_id: i64) -> Self {
        self.receiver_id = Some(receiver_id);
        self
    }

    pub fn with_created_at(mut self, created_at_ms: i64) -> Self {
        self.created_at = Some(created_at_ms);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_sender_profile(
        mut self,
        nickname: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Self {
        self.sender_nickname = Some(nickname.into());
        self.sender_avatar_url = avatar_url;
        self
    }

    pub fn subject(&self) -> Subject {
        match self.kind {
            NotificationKind::FriendRequest | NotificationKind::FriendRequestResponse => {
                Subject::FriendRequest {
                    request_id: self.request_id,
                    sender_id: self.sender_id,
                }
            }
            NotificationKind::PostLike
            | NotificationKind::CommentLike
            | NotificationKind::ReplyLike => Subject::Like {
                target_id: self.reference_id,
                sender_id: self.sender_id,
            },
            NotificationKind::CommentReply => Subject::Comment {
                comment_id: self.reference_id,
                post_id: self.reference_extra_id,
            },
            NotificationKind::PrivateMessage => Subject::Message {
                reference_id: self.reference_id,
            },
        }
    }

    /// Request id the backend expects when accepting or rejecting.
    pub fn effective_request_id(&self) -> Option<i64> {
        self.friend_request_id.or(self.request_id)
    }

    /// Whether both nickname and avatar are populated.
    pub fn has_sender_profile(&self) -> bool {
        is_filled(&self.sender_nickname) && is_filled(&self.sender_avatar_url)
    }

    /// Field-level override merge.
    ///
    /// Every populated field of `newer` (non-null, and non-empty for strings)
    /// replaces the stored value; absent fields keep what `self` already has.
    /// Merging never turns a populated field back into an empty one.
    pub fn merge_from(&mut self, newer: &Notification) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }

        fn take_str(dst: &mut Option<String>, src: &Option<String>) {
            if is_filled(src) {
                dst.clone_from(src);
            }
        }

        self.kind = newer.kind;
        take(&mut self.request_id, &newer.request_id);
        take(&mut self.reference_id, &newer.reference_id);
        take(&mut self.reference_extra_id, &newer.reference_extra_id);
        take(&mut self.sender_id, &newer.sender_id);
        take(&mut self.receiver_id, &newer.receiver_id);
        take(&mut self.created_at, &newer.created_at);
        take_str(&mut self.message, &newer.message);
        take(&mut self.comment_preview, &newer.comment_preview);
        take_str(&mut self.sender_nickname, &newer.sender_nickname);
        take_str(&mut self.sender_avatar_url, &newer.sender_avatar_url);
        take(&mut self.friend_request_id, &newer.friend_request_id);
    }
}

pub(crate) fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_is_lenient() {
        assert_eq!(
            NotificationKind::parse("FRIEND_REQUEST"),
            Some(NotificationKind::FriendRequest)
        );
        assert_eq!(
            NotificationKind::parse("friendRequest"),
            Some(NotificationKind::FriendRequest)
        );
        assert_eq!(
            NotificationKind::parse("post-like"),
            Some(NotificationKind::PostLike)
        );
        assert_eq!(NotificationKind::parse(""), None);
        assert_eq!(NotificationKind::parse("SYSTEM"), None);
    }

    #[test]
    fn test_kind_display_round_trips_through_from_str() {
        use std::str::FromStr;
        let kind = NotificationKind::FriendRequestResponse;
        assert_eq!(kind.to_string(), "FRIEND_REQUEST_RESPONSE");
        assert_eq!(NotificationKind::from_str(kind.as_str()).ok(), Some(kind));
    }

    #[test]
    fn test_as_str_matches_display_for_every_kind() {
        for kind in <NotificationKind as strum::IntoEnumIterator>::iter() {
            assert_eq!(kind.as_str(), kind.to_string());
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_merge_keeps_populated_fields() {
        let mut stored = Notification::new(NotificationKind::FriendRequest)
            .with_request_id(7)
            .with_sender(3)
            .with_sender_profile("Alice", Some("a.png".into()));

        let mut partial = Notification::new(NotificationKind::FriendRequest)
            .with_request_id(7)
            .with_sender(3);
        partial.sender_nickname = Some(String::new());
        partial.created_at = Some(200);

        stored.merge_from(&partial);
        assert_eq!(stored.sender_nickname.as_deref(), Some("Alice"));
        assert_eq!(stored.sender_avatar_url.as_deref(), Some("a.png"));
        assert_eq!(stored.created_at, Some(200));
    }

    #[test]
    fn test_merge_overwrites_with_newer_values() {
        let mut stored = Notification::new(NotificationKind::CommentReply)
            .with_reference(10, Some(1))
            .with_message("old");
        let newer = Notification::new(NotificationKind::CommentReply)
            .with_reference(10, Some(1))
            .with_message("new");

        stored.merge_from(&newer);
        assert_eq!(stored.message.as_deref(), Some("new"));
    }

    #[test]
    fn test_subject_for_like_uses_sender_and_target() {
        let n = Notification::new(NotificationKind::PostLike)
            .with_reference(5, None)
            .with_sender(9);
        assert_eq!(
            n.subject(),
            Subject::Like {
                target_id: Some(5),
                sender_id: Some(9)
            }
        );
    }

    #[test]
    fn test_preview_clip() {
        let preview = CommentPreview {
            post_id: 1,
            comment_id: 2,
            content: "héllo world".into(),
            nickname: None,
            avatar_url: None,
            created_at: None,
            post_title: None,
        };
        assert_eq!(preview.clipped(5), "héllo…");
        assert_eq!(preview.clipped(50), "héllo world");
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let n = Notification::new(NotificationKind::FriendRequest)
            .with_request_id(1)
            .with_sender_profile("Bob", None);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "FRIEND_REQUEST");
        assert_eq!(json["requestId"], 1);
        assert_eq!(json["_senderNickname"], "Bob");
        assert!(json.get("_senderAvatarUrl").is_none());
    }
}
