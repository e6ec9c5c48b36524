//! Integration tests for the notification pipeline.
//!
//! These tests run the real SQLite store (in-memory) behind fake REST and
//! push backends.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use serde_json::{Value, json};
use sse_codec::SseEvent;
use tokio::sync::broadcast;

use notify_client::api::{CommentNode, NotificationApi, PendingFriendRequest};
use notify_client::database::{
    self, NotificationMatch, NotificationRepository, SqlxNotificationRepository,
};
use notify_client::notification::{
    BackendConnector, ConnectionState, EventStream, IngestEvent, IngestSource, IngestorConfig,
    PreviewCache, PushChannel, RealtimeIngestor, SessionManager,
};
use notify_client::{Error, Inbox, InboxTab, NotificationKind, Result, Session, build_key};

const USER: &str = "42";

async fn setup_store() -> Arc<SqlxNotificationRepository> {
    let pool = database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    Arc::new(SqlxNotificationRepository::new(pool))
}

fn session(user_id: &str) -> Session {
    Session::new(user_id, format!("token-{user_id}"))
}

#[derive(Default)]
struct FakeApi {
    pending: Vec<PendingFriendRequest>,
    comments: Vec<CommentNode>,
    fail_respond: bool,
    /// Latency of the pending friend request lookup.
    pending_delay: Duration,
    pending_calls: AtomicUsize,
    comment_calls: AtomicUsize,
    responses: Mutex<Vec<(i64, bool)>>,
}

#[async_trait]
impl NotificationApi for FakeApi {
    async fn pending_friend_requests(&self) -> Result<Vec<PendingFriendRequest>> {
        self.pending_calls.fetch_add(1, Ordering::SeqCst);
        if !self.pending_delay.is_zero() {
            tokio::time::sleep(self.pending_delay).await;
        }
        Ok(self.pending.clone())
    }

    async fn post_comments(&self, _post_id: i64, _size: usize) -> Result<Vec<CommentNode>> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(self.comments.clone())
    }

    async fn respond_friend_request(&self, request_id: i64, accept: bool) -> Result<()> {
        if self.fail_respond {
            return Err(Error::api(500, "respond failed"));
        }
        self.responses.lock().push((request_id, accept));
        Ok(())
    }
}

/// Push channel replaying a fixed list of events per connection.
struct FakePush {
    events: Vec<SseEvent>,
    /// Keep the stream open after the last event instead of ending it.
    hold_open: bool,
    connects: AtomicUsize,
}

impl FakePush {
    fn ending(events: Vec<SseEvent>) -> Self {
        Self {
            events,
            hold_open: false,
            connects: AtomicUsize::new(0),
        }
    }

    fn open(events: Vec<SseEvent>) -> Self {
        Self {
            hold_open: true,
            ..Self::ending(events)
        }
    }
}

#[async_trait]
impl PushChannel for FakePush {
    async fn connect(&self, _session: &Session) -> Result<EventStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let events = stream::iter(self.events.clone().into_iter().map(Ok));
        if self.hold_open {
            Ok(events.chain(stream::pending()).boxed())
        } else {
            Ok(events.boxed())
        }
    }
}

fn init(items: Value) -> SseEvent {
    SseEvent::named("init", items.to_string())
}

fn live(item: Value) -> SseEvent {
    SseEvent::named("notification", item.to_string())
}

fn friend_request(request_id: i64, sender_id: i64, created_at: i64) -> Value {
    json!({
        "type": "FRIEND_REQUEST",
        "requestId": request_id,
        "senderId": sender_id,
        "receiverId": USER.parse::<i64>().unwrap(),
        "nickname": format!("user{sender_id}"),
        "avatarUrl": format!("https://cdn.example.com/{sender_id}.png"),
        "createdAt": created_at,
    })
}

fn post_like(post_id: i64, sender_id: i64, created_at: i64) -> Value {
    json!({
        "type": "POST_LIKE",
        "referenceId": post_id,
        "senderId": sender_id,
        "nickname": format!("user{sender_id}"),
        "createdAt": created_at,
    })
}

fn ingestor(
    user_id: &str,
    push: Arc<FakePush>,
    api: Arc<FakeApi>,
    store: Arc<SqlxNotificationRepository>,
    config: IngestorConfig,
) -> RealtimeIngestor {
    RealtimeIngestor::new(
        session(user_id),
        push,
        api,
        store,
        PreviewCache::new(),
        config,
    )
}

/// Start `ingestor` and wait until its stream ends and the state settles on `Closed`.
async fn run_to_close(ingestor: &RealtimeIngestor) {
    let mut state = ingestor.watch_state();
    assert!(ingestor.start());
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Closed),
    )
    .await
    .expect("ingestor did not close")
    .expect("state channel closed");
}

async fn wait_for_state(ingestor: &RealtimeIngestor, target: ConnectionState) {
    let mut state = ingestor.watch_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == target))
        .await
        .expect("state not reached")
        .expect("state channel closed");
}

fn drain(rx: &mut broadcast::Receiver<IngestEvent>) -> Vec<IngestEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_session_stays_disconnected() {
        let store = setup_store().await;
        let push = Arc::new(FakePush::open(vec![]));
        let ingestor = RealtimeIngestor::new(
            Session::anonymous(),
            push.clone(),
            Arc::new(FakeApi::default()),
            store,
            PreviewCache::new(),
            IngestorConfig::default(),
        );

        assert!(!ingestor.start());
        assert_eq!(ingestor.state(), ConnectionState::Disconnected);
        assert_eq!(push.connects.load(Ordering::SeqCst), 0);

        let no_token = RealtimeIngestor::new(
            Session {
                user_id: Some(USER.to_string()),
                token: None,
            },
            push.clone(),
            Arc::new(FakeApi::default()),
            setup_store().await,
            PreviewCache::new(),
            IngestorConfig::default(),
        );
        assert!(!no_token.start());
        assert_eq!(no_token.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_second_start_is_noop_and_stop_is_idempotent() {
        let store = setup_store().await;
        let push = Arc::new(FakePush::open(vec![]));
        let ingestor = ingestor(
            USER,
            push.clone(),
            Arc::new(FakeApi::default()),
            store,
            IngestorConfig::default(),
        );

        assert!(ingestor.start());
        assert!(!ingestor.start());
        wait_for_state(&ingestor, ConnectionState::Connected).await;
        assert_eq!(push.connects.load(Ordering::SeqCst), 1);

        ingestor.shutdown().await;
        assert_eq!(ingestor.state(), ConnectionState::Closed);
        ingestor.stop();
        ingestor.shutdown().await;
        assert!(!ingestor.is_running());

        // A closed ingestor may be started again.
        assert!(ingestor.start());
        wait_for_state(&ingestor, ConnectionState::Connected).await;
        assert_eq!(push.connects.load(Ordering::SeqCst), 2);
        ingestor.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_end_closes_without_reconnect() {
        let store = setup_store().await;
        let push = Arc::new(FakePush::ending(vec![]));
        let ingestor = ingestor(
            USER,
            push.clone(),
            Arc::new(FakeApi::default()),
            store,
            IngestorConfig::default(),
        );
        let mut rx = ingestor.subscribe();

        run_to_close(&ingestor).await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, IngestEvent::Error { .. })));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, IngestEvent::Reconnecting { .. }))
        );
        assert_eq!(push.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnect_policy_retries_then_closes() {
        let store = setup_store().await;
        let push = Arc::new(FakePush::ending(vec![]));
        let mut config = IngestorConfig::default();
        config.reconnect.max_attempts = 2;
        config.reconnect.initial_delay_ms = 1;
        config.reconnect.max_delay_ms = 2;

        let ingestor = ingestor(USER, push.clone(), Arc::new(FakeApi::default()), store, config);
        let mut rx = ingestor.subscribe();
        run_to_close(&ingestor).await;

        let attempts = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, IngestEvent::Reconnecting { .. }))
            .count();
        assert_eq!(attempts, 2);
        assert_eq!(push.connects.load(Ordering::SeqCst), 3);
    }
}

mod ingestion_tests {
    use super::*;

    #[tokio::test]
    async fn test_backlog_then_live_duplicate_yields_one_record() {
        let store = setup_store().await;
        let push = Arc::new(FakePush::ending(vec![
            init(json!([friend_request(7, 3, 1_000)])),
            live(friend_request(7, 3, 1_000)),
        ]));
        let ingestor = ingestor(
            USER,
            push,
            Arc::new(FakeApi::default()),
            store.clone(),
            IngestorConfig::default(),
        );
        let mut rx = ingestor.subscribe();

        run_to_close(&ingestor).await;

        assert_eq!(store.count(USER).await.unwrap(), 1);
        let stored: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                IngestEvent::Stored {
                    source, inserted, ..
                } => Some((source, inserted)),
                _ => None,
            })
            .collect();
        assert_eq!(
            stored,
            vec![(IngestSource::Backlog, 1), (IngestSource::Live, 0)]
        );
    }

    #[tokio::test]
    async fn test_ingesting_twice_is_idempotent() {
        let store = setup_store().await;
        let batch = json!({"data": {"list": [post_like(1, 5, 100), friend_request(2, 6, 200)]}});
        let push = Arc::new(FakePush::ending(vec![
            SseEvent::message(batch.to_string()),
            SseEvent::message(batch.to_string()),
        ]));
        let ingestor = ingestor(
            USER,
            push,
            Arc::new(FakeApi::default()),
            store.clone(),
            IngestorConfig::default(),
        );

        run_to_close(&ingestor).await;

        let records = store.preload(USER, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, NotificationKind::FriendRequest);
        assert_eq!(records[1].kind, NotificationKind::PostLike);
    }

    #[tokio::test]
    async fn test_merge_never_regresses_enrichment() {
        let store = setup_store().await;
        let mut bare = friend_request(9, 4, 500);
        bare["nickname"] = Value::Null;
        bare["avatarUrl"] = json!("");

        let push = Arc::new(FakePush::ending(vec![
            live(friend_request(9, 4, 500)),
            live(bare),
        ]));
        let ingestor = ingestor(
            USER,
            push,
            Arc::new(FakeApi::default()),
            store.clone(),
            IngestorConfig::default(),
        );

        run_to_close(&ingestor).await;

        let records = store.preload(USER, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sender_nickname.as_deref(), Some("user4"));
        assert_eq!(
            records[0].sender_avatar_url.as_deref(),
            Some("https://cdn.example.com/4.png")
        );
    }

    #[tokio::test]
    async fn test_like_discriminant_distinguishes_senders() {
        let store = setup_store().await;
        let push = Arc::new(FakePush::ending(vec![
            live(post_like(11, 1, 100)),
            live(post_like(11, 2, 200)),
            live(post_like(11, 1, 300)),
        ]));
        let ingestor = ingestor(
            USER,
            push,
            Arc::new(FakeApi::default()),
            store.clone(),
            IngestorConfig::default(),
        );

        run_to_close(&ingestor).await;

        let records = store.preload(USER, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sender_id, Some(1));
        assert_eq!(records[0].created_at, Some(300));
    }

    #[tokio::test]
    async fn test_rejected_items_are_never_stored() {
        let store = setup_store().await;
        let foreign = json!({
            "type": "POST_LIKE", "referenceId": 1, "senderId": 2, "receiverId": 999,
        });
        let system = json!({"type": "POST_LIKE", "referenceId": 1, "senderId": 0});
        let keyless = json!({"type": "POST_LIKE", "referenceId": 1, "nickname": "c"});
        let unknown = json!({"type": "SOMETHING_ELSE", "referenceId": 1});

        let push = Arc::new(FakePush::ending(vec![
            init(json!([foreign, system, keyless, unknown, post_like(5, 6, 10)])),
            SseEvent::named("notification", "{not json"),
            SseEvent::named("heartbeat", "{}"),
        ]));
        let ingestor = ingestor(
            USER,
            push,
            Arc::new(FakeApi::default()),
            store.clone(),
            IngestorConfig::default(),
        );
        let mut rx = ingestor.subscribe();

        run_to_close(&ingestor).await;

        assert_eq!(store.count(USER).await.unwrap(), 1);
        let dropped: usize = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                IngestEvent::Dropped { count, .. } => Some(count),
                _ => None,
            })
            .sum();
        assert_eq!(dropped, 5);
    }

    #[tokio::test]
    async fn test_cap_keeps_newest_per_user() {
        let store = setup_store().await;
        let likes: Vec<_> = (1..=5).map(|i| post_like(i, 1, i * 100)).collect();
        let push = Arc::new(FakePush::ending(vec![init(Value::Array(likes))]));
        let config = IngestorConfig {
            cap_per_user: 3,
            ..IngestorConfig::default()
        };
        let ingestor = ingestor(USER, push, Arc::new(FakeApi::default()), store.clone(), config);

        run_to_close(&ingestor).await;

        let created: Vec<_> = store
            .preload(USER, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.created_at.unwrap())
            .collect();
        assert_eq!(created, vec![500, 400, 300]);
    }

    #[tokio::test]
    async fn test_cross_user_isolation() {
        let store = setup_store().await;
        let payload = post_like(1, 2, 100);

        for user in ["42", "43"] {
            let push = Arc::new(FakePush::ending(vec![live(payload.clone())]));
            let ingestor = ingestor(
                user,
                push,
                Arc::new(FakeApi::default()),
                store.clone(),
                IngestorConfig::default(),
            );
            run_to_close(&ingestor).await;
        }

        assert_eq!(store.count("42").await.unwrap(), 1);
        assert_eq!(store.count("43").await.unwrap(), 1);

        store.clear_user("42").await.unwrap();
        assert_eq!(store.count("42").await.unwrap(), 0);
        assert_eq!(store.count("43").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_friend_request_filled_from_pending_list() {
        let store = setup_store().await;
        let api = Arc::new(FakeApi {
            pending: vec![PendingFriendRequest {
                request_id: 70,
                sender_id: Some(8),
                receiver_id: Some(42),
                nickname: Some("eight".into()),
                avatar_url: Some("8.png".into()),
                status: Some("PENDING".into()),
                created_at: Some(1_234),
                message: None,
            }],
            ..FakeApi::default()
        });
        let push = Arc::new(FakePush::ending(vec![live(json!({
            "type": "FRIEND_REQUEST",
            "referenceId": 70,
            "senderId": 8,
        }))]));
        let ingestor = ingestor(USER, push, api.clone(), store.clone(), IngestorConfig::default());

        run_to_close(&ingestor).await;

        let records = store.preload(USER, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].friend_request_id, Some(70));
        assert_eq!(records[0].sender_nickname.as_deref(), Some("eight"));
        assert_eq!(records[0].created_at, Some(1_234));
        assert_eq!(api.pending_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sender_only_friend_request_keyed_by_pending_match() {
        let store = setup_store().await;
        let api = Arc::new(FakeApi {
            pending: vec![PendingFriendRequest {
                request_id: 70,
                sender_id: Some(8),
                receiver_id: Some(42),
                nickname: Some("eight".into()),
                avatar_url: None,
                status: Some("PENDING".into()),
                created_at: Some(1_234),
                message: None,
            }],
            ..FakeApi::default()
        });
        let push = Arc::new(FakePush::ending(vec![live(json!({
            "type": "FRIEND_REQUEST",
            "senderId": 8,
        }))]));
        let ingestor = ingestor(USER, push, api.clone(), store.clone(), IngestorConfig::default());

        run_to_close(&ingestor).await;

        let records = store.preload(USER, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].friend_request_id, Some(70));
        assert_eq!(records[0].effective_request_id(), Some(70));
        assert_eq!(api.pending_calls.load(Ordering::SeqCst), 1);

        let key = build_key(USER, &records[0]).unwrap();
        assert_eq!(key.as_str(), "42:FRIEND_REQUEST:70");
        assert!(store.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_private_message_without_ids_is_kept() {
        let store = setup_store().await;
        let push = Arc::new(FakePush::ending(vec![live(json!({
            "type": "PRIVATE_MESSAGE",
            "senderId": 8,
            "message": "hi",
        }))]));
        let ingestor = ingestor(
            USER,
            push,
            Arc::new(FakeApi::default()),
            store.clone(),
            IngestorConfig::default(),
        );

        run_to_close(&ingestor).await;

        assert_eq!(store.count(USER).await.unwrap(), 1);
        let key = build_key(
            USER,
            &notify_client::Notification::new(NotificationKind::PrivateMessage),
        )
        .unwrap();
        assert_eq!(key.as_str(), "42:PRIVATE_MESSAGE:0");
        let stored = store.get(&key).await.unwrap().expect("message stored");
        assert_eq!(stored.message.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_shutdown_discards_batch_in_flight() {
        let store = setup_store().await;
        let api = Arc::new(FakeApi {
            pending_delay: Duration::from_millis(200),
            ..FakeApi::default()
        });
        let push = Arc::new(FakePush::open(vec![live(json!({
            "type": "FRIEND_REQUEST",
            "requestId": 5,
            "senderId": 8,
        }))]));
        let ingestor = ingestor(USER, push, api.clone(), store.clone(), IngestorConfig::default());
        let mut rx = ingestor.subscribe();

        assert!(ingestor.start());
        tokio::time::timeout(Duration::from_secs(5), async {
            while api.pending_calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("lookup never started");

        // The lookup is still sleeping; the batch finishes after cancellation.
        ingestor.shutdown().await;

        assert_eq!(ingestor.state(), ConnectionState::Closed);
        assert_eq!(store.count(USER).await.unwrap(), 0);
        assert!(
            !drain(&mut rx)
                .iter()
                .any(|e| matches!(e, IngestEvent::Stored { .. }))
        );
    }

    #[tokio::test]
    async fn test_comment_preview_fetched_once_per_comment() {
        let store = setup_store().await;
        let api = Arc::new(FakeApi {
            comments: vec![CommentNode {
                id: 1,
                post_id: Some(9),
                content: "top level".into(),
                nickname: None,
                avatar_url: None,
                created_at: None,
                post_title: Some("Post".into()),
                replies: vec![CommentNode {
                    id: 77,
                    post_id: Some(9),
                    content: "nested reply".into(),
                    nickname: Some("replier".into()),
                    avatar_url: None,
                    created_at: Some(10),
                    post_title: None,
                    replies: vec![],
                }],
            }],
            ..FakeApi::default()
        });

        let reply = |request_id: i64, sender_id: i64| {
            json!({
                "type": "COMMENT_REPLY",
                "requestId": request_id,
                "referenceId": 77,
                "referenceExtraId": 9,
                "senderId": sender_id,
                "createdAt": request_id * 10,
            })
        };
        let push = Arc::new(FakePush::ending(vec![
            init(json!([reply(1, 5), reply(2, 6)])),
            live(reply(3, 7)),
        ]));
        let ingestor = ingestor(USER, push, api.clone(), store.clone(), IngestorConfig::default());

        run_to_close(&ingestor).await;

        assert_eq!(api.comment_calls.load(Ordering::SeqCst), 1);
        let records = store.preload(USER, 10).await.unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            let preview = record.comment_preview.as_ref().expect("preview attached");
            assert_eq!(preview.comment_id, 77);
            assert_eq!(preview.content, "nested reply");
        }
    }
}

mod inbox_tests {
    use super::*;

    async fn seeded_store() -> Arc<SqlxNotificationRepository> {
        let store = setup_store().await;
        let push = Arc::new(FakePush::ending(vec![init(json!([
            friend_request(7, 3, 300),
            friend_request(8, 4, 200),
            post_like(1, 5, 100),
        ]))]));
        let ingestor = ingestor(
            USER,
            push,
            Arc::new(FakeApi::default()),
            store.clone(),
            IngestorConfig::default(),
        );
        run_to_close(&ingestor).await;
        store
    }

    #[tokio::test]
    async fn test_respond_deletes_request_everywhere() {
        let store = seeded_store().await;
        let api = FakeApi::default();
        let mut inbox = Inbox::load(store.as_ref(), USER, 100, 10).await.unwrap();
        assert_eq!(inbox.tab(InboxTab::FriendRequests).len(), 2);

        inbox
            .respond(&api, store.as_ref(), 7, true)
            .await
            .unwrap();

        assert_eq!(api.responses.lock().as_slice(), &[(7, true)]);
        assert_eq!(inbox.tab(InboxTab::FriendRequests).len(), 1);
        assert_eq!(store.count(USER).await.unwrap(), 2);

        let reloaded = Inbox::load(store.as_ref(), USER, 100, 10).await.unwrap();
        assert_eq!(reloaded.tab(InboxTab::FriendRequests).len(), 1);
        assert_eq!(reloaded.tab(InboxTab::Likes).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_respond_changes_nothing() {
        let store = seeded_store().await;
        let api = FakeApi {
            fail_respond: true,
            ..FakeApi::default()
        };
        let mut inbox = Inbox::load(store.as_ref(), USER, 100, 10).await.unwrap();

        let result = inbox.respond(&api, store.as_ref(), 7, false).await;
        assert!(matches!(result, Err(Error::Api { code: 500, .. })));
        assert_eq!(inbox.tab(InboxTab::FriendRequests).len(), 2);
        assert_eq!(store.count(USER).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_by_match_ignores_other_users() {
        let store = seeded_store().await;
        let removed = store
            .delete_by_match("43", NotificationMatch::friend_request(7))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let key = build_key(
            USER,
            &notify_client::Notification::new(NotificationKind::FriendRequest).with_request_id(7),
        )
        .unwrap();
        assert!(store.get(&key).await.unwrap().is_some());
    }
}

mod session_manager_tests {
    use super::*;

    struct FakeConnector {
        api: Arc<FakeApi>,
        push: Arc<FakePush>,
    }

    impl BackendConnector for FakeConnector {
        fn api(&self, _session: &Session) -> Result<Arc<dyn NotificationApi>> {
            Ok(self.api.clone())
        }

        fn push(&self) -> Result<Arc<dyn PushChannel>> {
            Ok(self.push.clone())
        }
    }

    #[tokio::test]
    async fn test_login_counts_live_and_logout_resets() {
        let store = setup_store().await;
        let connector = Arc::new(FakeConnector {
            api: Arc::new(FakeApi::default()),
            push: Arc::new(FakePush::open(vec![
                init(json!([post_like(1, 2, 100)])),
                live(post_like(2, 2, 200)),
                live(post_like(3, 2, 300)),
            ])),
        });
        let manager = SessionManager::new(connector, store.clone(), IngestorConfig::default());
        let mut badge = manager.badge().watch();

        let ingestor = manager.login(session(USER)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), badge.wait_for(|count| *count == 2))
            .await
            .expect("badge did not reach 2")
            .unwrap();
        assert_eq!(store.count(USER).await.unwrap(), 3);

        manager.logout().await;
        assert_eq!(manager.badge().count(), 0);
        assert_eq!(ingestor.state(), ConnectionState::Closed);
        assert!(manager.ingestor().is_none());
    }

    #[tokio::test]
    async fn test_login_replaces_previous_ingestor() {
        let store = setup_store().await;
        let connector = Arc::new(FakeConnector {
            api: Arc::new(FakeApi::default()),
            push: Arc::new(FakePush::open(vec![])),
        });
        let manager = SessionManager::new(connector.clone(), store, IngestorConfig::default());

        let first = manager.login(session("1")).await.unwrap();
        let second = manager.login(session("2")).await.unwrap();

        assert_eq!(first.state(), ConnectionState::Closed);
        assert!(!first.is_running());
        assert_eq!(
            manager.ingestor().unwrap().session().user_id(),
            Some("2")
        );
        wait_for_state(&second, ConnectionState::Connected).await;
        manager.logout().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_logins_leave_one_live_ingestor() {
        let store = setup_store().await;
        let connector = Arc::new(FakeConnector {
            api: Arc::new(FakeApi::default()),
            push: Arc::new(FakePush::open(vec![])),
        });
        let manager = SessionManager::new(connector.clone(), store, IngestorConfig::default());

        let first = manager.login(session("1")).await.unwrap();
        wait_for_state(&first, ConnectionState::Connected).await;

        let (a, b) = tokio::join!(manager.login(session("2")), manager.login(session("3")));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(first.state(), ConnectionState::Closed);
        let running: Vec<_> = [&a, &b].into_iter().filter(|i| i.is_running()).collect();
        assert_eq!(running.len(), 1);

        let current = manager.ingestor().expect("a session is active");
        assert!(Arc::ptr_eq(&current, running[0]));

        manager.logout().await;
        assert!(!a.is_running());
        assert!(!b.is_running());
    }
}
