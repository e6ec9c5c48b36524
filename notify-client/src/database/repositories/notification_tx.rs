//! Transactional operations on notification rows.

use sqlx::SqliteConnection;

use crate::Result;
use crate::database::models::NotificationDbModel;

/// Row-level operations that run inside a caller-owned transaction.
///
/// None of these commit; the caller commits or rolls back.
pub struct NotificationTxOps;

impl NotificationTxOps {
    pub async fn get(tx: &mut SqliteConnection, id: &str) -> Result<Option<NotificationDbModel>> {
        let row = sqlx::query_as::<_, NotificationDbModel>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(tx)
            .await?;
        Ok(row)
    }

    /// Insert the row or replace every column of an existing one.
    pub async fn upsert(tx: &mut SqliteConnection, row: &NotificationDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, user_id, kind, request_id, reference_id, reference_extra_id,
                sender_id, receiver_id, created_at, message, sender_nickname,
                sender_avatar_url, friend_request_id, comment_preview, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                request_id = excluded.request_id,
                reference_id = excluded.reference_id,
                reference_extra_id = excluded.reference_extra_id,
                sender_id = excluded.sender_id,
                receiver_id = excluded.receiver_id,
                created_at = excluded.created_at,
                message = excluded.message,
                sender_nickname = excluded.sender_nickname,
                sender_avatar_url = excluded.sender_avatar_url,
                friend_request_id = excluded.friend_request_id,
                comment_preview = excluded.comment_preview,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.kind)
        .bind(row.request_id)
        .bind(row.reference_id)
        .bind(row.reference_extra_id)
        .bind(row.sender_id)
        .bind(row.receiver_id)
        .bind(row.created_at)
        .bind(&row.message)
        .bind(&row.sender_nickname)
        .bind(&row.sender_avatar_url)
        .bind(row.friend_request_id)
        .bind(&row.comment_preview)
        .bind(row.updated_at)
        .execute(tx)
        .await?;
        Ok(())
    }

    /// Delete everything past the newest `cap` rows of `user_id`.
    ///
    /// Returns the ids of the deleted rows.
    pub async fn trim(tx: &mut SqliteConnection, user_id: &str, cap: usize) -> Result<Vec<String>> {
        let cap = i64::try_from(cap).unwrap_or(i64::MAX);
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            DELETE FROM notifications
            WHERE id IN (
                SELECT id FROM notifications
                WHERE user_id = ?
                ORDER BY created_at DESC, updated_at DESC, id DESC
                LIMIT -1 OFFSET ?
            )
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(cap)
        .fetch_all(tx)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
