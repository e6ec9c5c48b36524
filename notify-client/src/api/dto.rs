//! Response shapes of the REST endpoints.
//!
//! DTOs are read leniently from `serde_json::Value` using the same alias
//! helpers as notification normalization.

use serde_json::Value;

use crate::domain::wire::{as_i64, as_string, field};
use crate::domain::{CommentPreview, parse_timestamp};
use crate::{Error, Result};

/// Codes the backend uses for success.
const SUCCESS_CODES: &[i64] = &[0, 200];

/// Unwrap `{code, data, message}`, failing on a non-success code.
///
/// A body without `code` is taken as bare data.
pub fn unwrap_envelope(body: Value) -> Result<Value> {
    let Value::Object(mut obj) = body else {
        return Ok(body);
    };

    let Some(code) = obj.get("code").and_then(as_i64) else {
        return Ok(Value::Object(obj));
    };

    if !SUCCESS_CODES.contains(&code) {
        let message = obj
            .get("message")
            .or_else(|| obj.get("msg"))
            .and_then(as_string)
            .unwrap_or_else(|| "request failed".to_string());
        return Err(Error::api(code, message));
    }

    Ok(obj.remove("data").unwrap_or(Value::Null))
}

/// Items of `data` when it is a bare array or `{list | records: [...]}`.
pub fn list_items(data: &Value) -> &[Value] {
    match data {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => ["list", "records"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    }
}

/// One entry of `GET /api/friends/pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFriendRequest {
    pub request_id: i64,
    pub sender_id: Option<i64>,
    pub receiver_id: Option<i64>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<i64>,
    pub message: Option<String>,
}

impl PendingFriendRequest {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let sender = ["sender", "fromUser", "user"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_object));
        let nested = |names: &[&str]| sender.and_then(|s| field(s, names));

        let request_id = field(obj, &["id", "requestId", "friendRequestId"]).and_then(as_i64)?;

        Some(Self {
            request_id,
            sender_id: field(obj, &["senderId", "fromUserId"])
                .or_else(|| nested(&["id", "userId"]))
                .and_then(as_i64),
            receiver_id: field(obj, &["receiverId", "toUserId"]).and_then(as_i64),
            nickname: field(obj, &["senderNickname", "nickname"])
                .or_else(|| nested(&["nickname", "username"]))
                .and_then(as_string),
            avatar_url: field(obj, &["senderAvatarUrl", "avatarUrl"])
                .or_else(|| nested(&["avatarUrl", "avatar"]))
                .and_then(as_string),
            status: field(obj, &["status"]).and_then(as_string),
            created_at: field(obj, &["createdAt", "createTime"]).and_then(parse_timestamp),
            message: field(obj, &["message"]).and_then(as_string),
        })
    }
}

/// One comment of `GET /api/comment/list/{postId}`, with its replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub id: i64,
    pub post_id: Option<i64>,
    pub content: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: Option<i64>,
    pub post_title: Option<String>,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let author = ["user", "author"]
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_object));
        let nested = |names: &[&str]| author.and_then(|a| field(a, names));

        let replies = ["replies", "children"]
            .iter()
            .filter_map(|name| obj.get(*name))
            .flat_map(list_items)
            .filter_map(Self::from_value)
            .collect();

        Some(Self {
            id: field(obj, &["id", "commentId"]).and_then(as_i64)?,
            post_id: field(obj, &["postId"]).and_then(as_i64),
            content: field(obj, &["content", "text"])
                .and_then(as_string)
                .unwrap_or_default(),
            nickname: field(obj, &["nickname", "username"])
                .or_else(|| nested(&["nickname", "username"]))
                .and_then(as_string),
            avatar_url: field(obj, &["avatarUrl", "avatar"])
                .or_else(|| nested(&["avatarUrl", "avatar"]))
                .and_then(as_string),
            created_at: field(obj, &["createdAt", "createTime"]).and_then(parse_timestamp),
            post_title: field(obj, &["postTitle"]).and_then(as_string),
            replies,
        })
    }

    /// Depth-first search for `comment_id` among `nodes` and their replies.
    pub fn find(nodes: &[CommentNode], comment_id: i64) -> Option<&CommentNode> {
        nodes.iter().find_map(|node| {
            if node.id == comment_id {
                Some(node)
            } else {
                Self::find(&node.replies, comment_id)
            }
        })
    }

    pub fn to_preview(&self, post_id: i64) -> CommentPreview {
        CommentPreview {
            post_id: self.post_id.unwrap_or(post_id),
            comment_id: self.id,
            content: self.content.clone(),
            nickname: self.nickname.clone(),
            avatar_url: self.avatar_url.clone(),
            created_at: self.created_at,
            post_title: self.post_title.clone(),
        }
    }
}

pub(crate) fn parse_list<T>(data: &Value, parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    list_items(data).iter().filter_map(parse).collect()
}
