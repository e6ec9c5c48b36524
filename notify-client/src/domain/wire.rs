//! Normalization of backend payloads into canonical notifications.
//!
//! The backend is loose about field names: the same concept shows up as
//! `requestId` or `friendRequestId`, ids arrive as numbers or numeric
//! strings, and timestamps as epoch numbers, ISO strings or
//! `LocalDateTime` arrays. Everything is resolved here, once, so the rest of
//! the crate only ever sees [`Notification`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use super::notification::{CommentPreview, Notification, NotificationKind};
use crate::{Error, Result};

const TYPE_FIELDS: &[&str] = &["type", "notificationType", "notification_type"];
const REQUEST_ID_FIELDS: &[&str] = &["requestId", "request_id", "friendRequestId"];
const REFERENCE_ID_FIELDS: &[&str] = &["referenceId", "reference_id", "refId"];
const REFERENCE_EXTRA_ID_FIELDS: &[&str] = &["referenceExtraId", "reference_extra_id", "postId"];
const SENDER_ID_FIELDS: &[&str] = &["senderId", "sender_id", "fromUserId"];
const RECEIVER_ID_FIELDS: &[&str] = &["receiverId", "receiver_id", "toUserId"];
const CREATED_AT_FIELDS: &[&str] = &["createdAt", "created_at", "createTime", "timestamp"];
const MESSAGE_FIELDS: &[&str] = &["message", "content"];
const NICKNAME_FIELDS: &[&str] = &["_senderNickname", "senderNickname", "nickname"];
const AVATAR_FIELDS: &[&str] = &["_senderAvatarUrl", "senderAvatarUrl", "avatarUrl"];

/// First non-null value among `names`.
pub(crate) fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|value| !value.is_null())
}

/// Integer from a JSON number or numeric string.
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty string from a JSON string or number.
pub(crate) fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_field(obj: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    field(obj, names).and_then(as_i64)
}

fn string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names).and_then(as_string)
}

/// Parse a timestamp into Unix epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(_) => as_i64(value),
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Array(parts) => parse_local_date_time_array(parts),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }

    if let Ok(epoch) = s.parse::<i64>() {
        return Some(epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }

    // Zone-less timestamps are taken as UTC.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// `[year, month, day, hour, minute, second, nanos]`, trailing parts optional.
fn parse_local_date_time_array(parts: &[Value]) -> Option<i64> {
    let num = |idx: usize| parts.get(idx).and_then(as_i64).unwrap_or(0);
    if parts.len() < 3 {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(
        i32::try_from(num(0)).ok()?,
        u32::try_from(num(1)).ok()?,
        u32::try_from(num(2)).ok()?,
    )?;
    let time = date.and_hms_nano_opt(
        u32::try_from(num(3)).ok()?,
        u32::try_from(num(4)).ok()?,
        u32::try_from(num(5)).ok()?,
        u32::try_from(num(6)).ok()?,
    )?;
    Some(time.and_utc().timestamp_millis())
}

/// Normalize one raw notification object.
pub fn normalize(value: &Value) -> Result<Notification> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::malformed("notification is not a JSON object"))?;

    let raw_kind = field(obj, TYPE_FIELDS)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed("notification has no type"))?;
    let kind = NotificationKind::parse(raw_kind)
        .ok_or_else(|| Error::malformed(format!("unknown notification type '{raw_kind}'")))?;

    let sender = obj.get("sender").and_then(Value::as_object);

    let mut notification = Notification::new(kind);
    notification.request_id = id_field(obj, REQUEST_ID_FIELDS);
    notification.reference_id = id_field(obj, REFERENCE_ID_FIELDS);
    notification.reference_extra_id = id_field(obj, REFERENCE_EXTRA_ID_FIELDS);
    notification.sender_id = id_field(obj, SENDER_ID_FIELDS)
        .or_else(|| sender.and_then(|s| id_field(s, &["id", "userId"])));
    notification.receiver_id = id_field(obj, RECEIVER_ID_FIELDS);
    notification.created_at = field(obj, CREATED_AT_FIELDS).and_then(parse_timestamp);
    notification.message = string_field(obj, MESSAGE_FIELDS);
    notification.sender_nickname = string_field(obj, NICKNAME_FIELDS)
        .or_else(|| sender.and_then(|s| string_field(s, &["nickname", "username"])));
    notification.sender_avatar_url = string_field(obj, AVATAR_FIELDS)
        .or_else(|| sender.and_then(|s| string_field(s, &["avatarUrl", "avatar"])));
    notification.friend_request_id = id_field(obj, &["_friendRequestId"]);
    notification.comment_preview = obj
        .get("_commentPreview")
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value::<CommentPreview>(v.clone()).ok());

    Ok(notification)
}

/// Extract the list of items from a batch payload.
///
/// Accepts a bare array, `{data: [...]}`, `{data: {list: [...]}}` and
/// `{list: [...]}`. Any other object is treated as a single item.
pub fn extract_items(payload: &Value) -> Vec<&Value> {
    fn list_of(value: &Value) -> Option<&Vec<Value>> {
        match value {
            Value::Array(items) => Some(items),
            Value::Object(obj) => obj.get("list").and_then(Value::as_array),
            _ => None,
        }
    }

    if let Some(items) = list_of(payload) {
        return items.iter().collect();
    }

    if let Some(data) = payload.get("data") {
        if let Some(items) = list_of(data) {
            return items.iter().collect();
        }
        if data.is_object() {
            return vec![data];
        }
    }

    match payload {
        Value::Object(_) => vec![payload],
        _ => Vec::new(),
    }
}
