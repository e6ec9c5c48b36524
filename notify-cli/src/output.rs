use anyhow::Result;
use chrono::Local;
#[cfg(feature = "colored-output")]
use colored::*;
use notify_client::database::time::ms_to_datetime;
use notify_client::notification::IngestEvent;
use notify_client::{InboxPage, Notification, NotificationKind};

use crate::cli::OutputFormat;

const PREVIEW_CHARS: usize = 60;

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_page(&self, page: &InboxPage<'_>, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "tab": page.tab.to_string(),
                "page": page.page,
                "totalPages": page.total_pages,
                "totalItems": page.total_items,
                "items": page.items,
            }))?),
            OutputFormat::Pretty => {
                let mut output = String::new();
                output.push_str(&self.colorize(
                    &format!(
                        "{} (page {}/{}, {} total)",
                        page.tab, page.page, page.total_pages, page.total_items
                    ),
                    Color::Green,
                    true,
                ));
                output.push('\n');

                if page.items.is_empty() {
                    output.push_str("  (empty)\n");
                }
                for notification in &page.items {
                    output.push_str("  ");
                    output.push_str(&self.format_notification(notification));
                    output.push('\n');
                }
                Ok(output)
            }
        }
    }

    /// Render an ingestor event. Returns `None` for events not worth printing.
    pub fn format_event(&self, event: &IngestEvent, format: OutputFormat) -> Option<String> {
        match (event, format) {
            (IngestEvent::Stored { notifications, .. }, OutputFormat::Json) => {
                let lines: Vec<String> = notifications
                    .iter()
                    .filter_map(|n| serde_json::to_string(n).ok())
                    .collect();
                Some(lines.join("\n"))
            }
            (_, OutputFormat::Json) => None,
            (
                IngestEvent::Stored {
                    source,
                    inserted,
                    notifications,
                },
                OutputFormat::Pretty,
            ) => {
                let mut output = self.colorize(
                    &format!("[{source}] {} stored, {inserted} new", notifications.len()),
                    Color::Blue,
                    false,
                );
                for notification in notifications.iter() {
                    output.push_str("\n  ");
                    output.push_str(&self.format_notification(notification));
                }
                Some(output)
            }
            (IngestEvent::StateChanged(state), _) => {
                Some(self.colorize(&format!("connection: {state}"), Color::Yellow, false))
            }
            (IngestEvent::Reconnecting { attempt }, _) => Some(self.colorize(
                &format!("reconnecting (attempt {attempt})"),
                Color::Yellow,
                false,
            )),
            (IngestEvent::Error { error }, _) => {
                Some(self.colorize(&format!("stream error: {error}"), Color::Red, false))
            }
            (IngestEvent::Dropped { .. }, _) => None,
        }
    }

    pub fn format_notification(&self, n: &Notification) -> String {
        let when = n
            .created_at
            .and_then(ms_to_datetime)
            .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let who = n
            .sender_nickname
            .clone()
            .or_else(|| n.sender_id.map(|id| format!("user #{id}")))
            .unwrap_or_else(|| "someone".to_string());

        let summary = match n.kind {
            NotificationKind::FriendRequest => {
                let id = n
                    .effective_request_id()
                    .map(|id| format!(" (request {id})"))
                    .unwrap_or_default();
                format!("{who} sent you a friend request{id}")
            }
            NotificationKind::FriendRequestResponse => {
                format!("{who} answered your friend request")
            }
            NotificationKind::PostLike => format!("{who} liked your post"),
            NotificationKind::CommentLike => format!("{who} liked your comment"),
            NotificationKind::ReplyLike => format!("{who} liked your reply"),
            NotificationKind::CommentReply => format!("{who} replied to your comment"),
            NotificationKind::PrivateMessage => format!("{who} sent you a message"),
        };

        let mut line = format!(
            "{} {}",
            self.colorize(&when, Color::Cyan, false),
            summary
        );
        if let Some(preview) = &n.comment_preview {
            line.push_str(&format!(": \"{}\"", preview.clipped(PREVIEW_CHARS)));
        } else if let Some(message) = n.message.as_deref().filter(|m| !m.is_empty()) {
            line.push_str(&format!(": {message}"));
        }
        line
    }

    fn colorize(&self, text: &str, color: Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

#[derive(Clone, Copy)]
enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Red,
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_client::domain::CommentPreview;

    #[test]
    fn test_comment_reply_shows_clipped_preview() {
        let mut n = notify_client::Notification::new(NotificationKind::CommentReply)
            .with_sender_profile("ann", None);
        n.comment_preview = Some(CommentPreview {
            post_id: 1,
            comment_id: 2,
            content: "x".repeat(100),
            nickname: None,
            avatar_url: None,
            created_at: None,
            post_title: None,
        });

        let line = OutputManager::new(false).format_notification(&n);
        assert!(line.starts_with("- ann replied to your comment: \""));
        assert!(line.ends_with("…\""));
    }

    #[test]
    fn test_friend_request_mentions_request_id() {
        let n = notify_client::Notification::new(NotificationKind::FriendRequest)
            .with_request_id(5)
            .with_sender(9);
        let line = OutputManager::new(false).format_notification(&n);
        assert!(line.contains("user #9 sent you a friend request (request 5)"));
    }
}
