//! Notification repository.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use super::NotificationTxOps;
use crate::Result;
use crate::database::models::NotificationDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::database::{DbPool, begin_immediate};
use crate::domain::{IdentityKey, Notification, NotificationKind, build_key};

/// Selects the records resolved by a friend-request response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationMatch {
    pub kind: NotificationKind,
    /// Matched against both `request_id` and `friend_request_id`.
    pub request_id: i64,
}

impl NotificationMatch {
    pub fn friend_request(request_id: i64) -> Self {
        Self {
            kind: NotificationKind::FriendRequest,
            request_id,
        }
    }
}

/// Outcome of one [`NotificationRepository::upsert_batch`] call.
#[derive(Debug, Clone, Default)]
pub struct UpsertSummary {
    /// New records.
    pub inserted: usize,
    /// Existing records updated by field merge.
    pub merged: usize,
    /// Items without an identity key.
    pub dropped: usize,
    /// Records removed by the per-user cap, including ones from this batch.
    pub trimmed: usize,
    /// Post-merge state of every record this batch touched and the cap kept,
    /// in first-seen order.
    pub stored: Vec<Notification>,
}

impl UpsertSummary {
    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }
}

/// Persistent notification log, partitioned by user.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Up to `limit` records of `user_id`, newest first.
    async fn preload(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>>;

    /// Merge `notifications` into the log and trim it to `cap_per_user`.
    ///
    /// A `cap_per_user` of zero disables trimming.
    async fn upsert_batch(
        &self,
        user_id: &str,
        notifications: &[Notification],
        cap_per_user: usize,
    ) -> Result<UpsertSummary>;

    /// Remove every record matching `matcher`. Returns the number removed.
    async fn delete_by_match(&self, user_id: &str, matcher: NotificationMatch) -> Result<u64>;

    async fn count(&self, user_id: &str) -> Result<u64>;

    async fn get(&self, key: &IdentityKey) -> Result<Option<Notification>>;

    /// Remove every record of `user_id`.
    async fn clear_user(&self, user_id: &str) -> Result<u64>;
}

/// SQLx implementation of [`NotificationRepository`].
#[derive(Clone)]
pub struct SqlxNotificationRepository {
    pool: DbPool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn upsert_batch_once(
        &self,
        user_id: &str,
        batch: &[(IdentityKey, Notification)],
        cap_per_user: usize,
    ) -> Result<UpsertSummary> {
        let mut tx = begin_immediate(&self.pool).await?;
        match apply_batch(&mut tx, user_id, batch, cap_per_user).await {
            Ok(summary) => {
                tx.commit().await?;
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Failed to roll back notification upsert");
                }
                Err(e)
            }
        }
    }
}

/// Resolve keys and fold in-batch duplicates in arrival order.
fn collapse_batch(
    user_id: &str,
    notifications: &[Notification],
) -> (Vec<(IdentityKey, Notification)>, usize) {
    let mut collapsed: Vec<(IdentityKey, Notification)> = Vec::with_capacity(notifications.len());
    let mut positions: HashMap<IdentityKey, usize> = HashMap::new();
    let mut dropped = 0;

    for notification in notifications {
        let Some(key) = build_key(user_id, notification) else {
            dropped += 1;
            continue;
        };

        match positions.get(&key) {
            Some(&idx) => collapsed[idx].1.merge_from(notification),
            None => {
                positions.insert(key.clone(), collapsed.len());
                collapsed.push((key, notification.clone()));
            }
        }
    }

    (collapsed, dropped)
}

async fn apply_batch(
    tx: &mut SqliteConnection,
    user_id: &str,
    batch: &[(IdentityKey, Notification)],
    cap_per_user: usize,
) -> Result<UpsertSummary> {
    let now = now_ms();
    let mut summary = UpsertSummary::default();
    let mut stored = Vec::with_capacity(batch.len());

    for (key, incoming) in batch {
        let merged = match NotificationTxOps::get(tx, key.as_str()).await? {
            Some(existing) => {
                let mut current = existing.into_domain()?;
                current.merge_from(incoming);
                summary.merged += 1;
                current
            }
            None => {
                let mut fresh = incoming.clone();
                fresh.created_at.get_or_insert(now);
                summary.inserted += 1;
                fresh
            }
        };

        let created_at = merged.created_at.unwrap_or(now);
        let row = NotificationDbModel::from_domain(key, user_id, &merged, created_at, now)?;
        NotificationTxOps::upsert(tx, &row).await?;
        stored.push((key.as_str().to_string(), merged));
    }

    if cap_per_user > 0 {
        let trimmed = NotificationTxOps::trim(tx, user_id, cap_per_user).await?;
        summary.trimmed = trimmed.len();
        if !trimmed.is_empty() {
            let trimmed: HashSet<String> = trimmed.into_iter().collect();
            stored.retain(|(id, _)| !trimmed.contains(id));
        }
    }

    summary.stored = stored.into_iter().map(|(_, n)| n).collect();
    Ok(summary)
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn preload(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let user_id = user_id.trim();
        let rows = sqlx::query_as::<_, NotificationDbModel>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, updated_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                row.into_domain()
                    .inspect_err(|e| warn!(%id, error = %e, "Skipping unreadable notification row"))
                    .ok()
            })
            .collect())
    }

    async fn upsert_batch(
        &self,
        user_id: &str,
        notifications: &[Notification],
        cap_per_user: usize,
    ) -> Result<UpsertSummary> {
        let user_id = user_id.trim();
        let (batch, dropped) = collapse_batch(user_id, notifications);
        if dropped > 0 {
            debug!(user_id, dropped, "Dropped notifications without identity key");
        }
        if batch.is_empty() {
            return Ok(UpsertSummary {
                dropped,
                ..Default::default()
            });
        }

        let mut summary = retry_on_sqlite_busy("notification_upsert_batch", || {
            self.upsert_batch_once(user_id, &batch, cap_per_user)
        })
        .await?;
        summary.dropped = dropped;

        debug!(
            user_id,
            inserted = summary.inserted,
            merged = summary.merged,
            dropped = summary.dropped,
            trimmed = summary.trimmed,
            "Upserted notification batch"
        );
        Ok(summary)
    }

    async fn delete_by_match(&self, user_id: &str, matcher: NotificationMatch) -> Result<u64> {
        let user_id = user_id.trim();
        let result = retry_on_sqlite_busy("notification_delete_by_match", || async move {
            let result = sqlx::query(
                r#"
                DELETE FROM notifications
                WHERE user_id = ? AND kind = ?
                  AND (request_id = ? OR friend_request_id = ?)
                "#,
            )
            .bind(user_id)
            .bind(matcher.kind.as_str())
            .bind(matcher.request_id)
            .bind(matcher.request_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        debug!(
            user_id,
            kind = %matcher.kind,
            request_id = matcher.request_id,
            removed = result,
            "Deleted matching notifications"
        );
        Ok(result)
    }

    async fn count(&self, user_id: &str) -> Result<u64> {
        let user_id = user_id.trim();
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn get(&self, key: &IdentityKey) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationDbModel>("SELECT * FROM notifications WHERE id = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(NotificationDbModel::into_domain).transpose()
    }

    async fn clear_user(&self, user_id: &str) -> Result<u64> {
        let user_id = user_id.trim();
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
