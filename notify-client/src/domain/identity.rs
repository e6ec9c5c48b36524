//! Identity keys for de-duplicating notifications across sources.

use std::fmt;

use super::notification::{Notification, Subject};

/// Stable identity of a notification for one viewer.
///
/// Used both as the store primary key and as the in-memory de-duplication
/// key. Two payloads with the same key are the same notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the identity key of `notification` as seen by `user_id`.
///
/// Likes are keyed on target and sender, so only the latest like state per
/// sender and object survives. Every other kind is keyed on `request_id`,
/// then `reference_id`, then the enriched `_friendRequestId`, and finally `0`.
/// Returns `None` when the viewer is missing or a like lacks its target or
/// sender; such notifications must not be stored.
pub fn build_key(user_id: &str, notification: &Notification) -> Option<IdentityKey> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return None;
    }

    let kind = notification.kind.as_str();
    let key = match notification.subject() {
        Subject::Like {
            target_id: Some(target),
            sender_id: Some(sender),
        } => format!("{user_id}:{kind}:{target}:{sender}"),
        Subject::Like { .. } => return None,
        _ => {
            let discriminant = notification
                .request_id
                .or(notification.reference_id)
                .or(notification.friend_request_id)
                .unwrap_or(0);
            format!("{user_id}:{kind}:{discriminant}")
        }
    };

    Some(IdentityKey(key))
}
