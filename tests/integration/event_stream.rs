//! Integration tests for the subscription stream.
//!
//! Connects real WebSocket clients to a running gateway, subscribes to
//! topics, and drives mutations over HTTP to observe the fan-out: scoping,
//! ordering, authorization, unsubscribe, and forced close on token expiry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite;

use taskwire::auth::{Claims, TokenVerifier};
use taskwire::bus::EventBus;
use taskwire::directory::InMemoryDirectory;
use taskwire::engine::TaskEngine;
use taskwire::ratelimit::RateLimiter;
use taskwire::server::{AppState, start_server};
use taskwire_proto::error::ErrorKind;
use taskwire_proto::stream::{ClientFrame, EventPayload, ServerFrame, decode_server, encode_client};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestIssuer {
    private_pem: String,
    public_pem: String,
}

impl TestIssuer {
    fn new() -> Self {
        let keypair = rcgen::KeyPair::generate().unwrap();
        Self {
            private_pem: keypair.serialize_pem(),
            public_pem: keypair.public_key_pem(),
        }
    }

    fn mint(&self, sub: &str, team: &str, role: &str, ttl_secs: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            sub: sub.to_string(),
            email: format!("{sub}@example.com"),
            name: sub.to_string(),
            role: role.to_string(),
            team_id: team.to_string(),
            exp: now.saturating_add_signed(ttl_secs),
        };
        encode(
            &Header::new(Algorithm::ES256),
            &claims,
            &EncodingKey::from_ec_pem(self.private_pem.as_bytes()).unwrap(),
        )
        .unwrap()
    }
}

async fn start_gateway(issuer: &TestIssuer) -> std::net::SocketAddr {
    let verifier =
        TokenVerifier::from_pem(issuer.public_pem.as_bytes(), Algorithm::ES256).unwrap();
    let bus = Arc::new(EventBus::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let engine = Arc::new(TaskEngine::new(Arc::clone(&bus), directory));
    let state = AppState {
        engine,
        bus,
        verifier: Arc::new(verifier),
        limiter: RateLimiter::new(10_000, Duration::from_secs(60)),
    };
    let (addr, _handle) = start_server("127.0.0.1:0", state).await.unwrap();
    addr
}

async fn connect(addr: std::net::SocketAddr, token: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    ws
}

async fn send_frame(ws: &mut WsStream, frame: &ClientFrame) {
    let text = encode_client(frame).unwrap();
    ws.send(tungstenite::Message::Text(text.into()))
        .await
        .unwrap();
}

async fn recv_frame(ws: &mut WsStream) -> ServerFrame {
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        match msg {
            tungstenite::Message::Text(text) => return decode_server(text.as_str()).unwrap(),
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => {}
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

async fn subscribe(ws: &mut WsStream, topic: &str) {
    send_frame(
        ws,
        &ClientFrame::Subscribe {
            topic: topic.to_string(),
        },
    )
    .await;
    let ack = recv_frame(ws).await;
    assert_eq!(
        ack,
        ServerFrame::Subscribed {
            topic: topic.to_string()
        }
    );
}

async fn create_task(addr: std::net::SocketAddr, token: &str, body: Value) -> Value {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/tasks"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

fn event_task_title(frame: &ServerFrame) -> String {
    match frame {
        ServerFrame::Event {
            event: EventPayload::Task { task },
            ..
        } => task.title.clone(),
        other => panic!("expected task event, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscriber_receives_team_creates_in_order() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-1", "t-1", "member", 600);
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &watcher).await;
    subscribe(&mut ws, "task-created:t-1").await;

    create_task(
        addr,
        &creator,
        json!({"title": "first", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;
    create_task(
        addr,
        &creator,
        json!({"title": "second", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;

    assert_eq!(event_task_title(&recv_frame(&mut ws).await), "first");
    assert_eq!(event_task_title(&recv_frame(&mut ws).await), "second");
}

#[tokio::test]
async fn subscriber_sees_nothing_from_other_teams() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let t1_creator = issuer.mint("u-1", "t-1", "member", 600);
    let t2_creator = issuer.mint("u-9", "t-2", "member", 600);
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &watcher).await;
    subscribe(&mut ws, "task-created:t-1").await;

    // A foreign-team create, then an own-team create.
    create_task(
        addr,
        &t2_creator,
        json!({"title": "foreign", "priority": "LOW", "team_id": "t-2"}),
    )
    .await;
    create_task(
        addr,
        &t1_creator,
        json!({"title": "ours", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;

    // The first event to arrive is the own-team one; the foreign create
    // was never delivered.
    assert_eq!(event_task_title(&recv_frame(&mut ws).await), "ours");
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-1", "t-1", "member", 600);
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &watcher).await;
    subscribe(&mut ws, "task-created:t-1").await;

    create_task(
        addr,
        &creator,
        json!({"title": "seen", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;
    assert_eq!(event_task_title(&recv_frame(&mut ws).await), "seen");

    send_frame(
        &mut ws,
        &ClientFrame::Unsubscribe {
            topic: "task-created:t-1".to_string(),
        },
    )
    .await;
    assert_eq!(
        recv_frame(&mut ws).await,
        ServerFrame::Unsubscribed {
            topic: "task-created:t-1".to_string()
        }
    );

    create_task(
        addr,
        &creator,
        json!({"title": "unseen", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;

    let nothing = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(nothing.is_err(), "no event should arrive after unsubscribe");
}

#[tokio::test]
async fn forbidden_topic_does_not_drop_the_session() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &watcher).await;

    // Someone else's notification stream is refused.
    send_frame(
        &mut ws,
        &ClientFrame::Subscribe {
            topic: "notification:u-9".to_string(),
        },
    )
    .await;
    match recv_frame(&mut ws).await {
        ServerFrame::Error { kind, .. } => assert_eq!(kind, ErrorKind::Forbidden),
        other => panic!("expected error frame, got {other:?}"),
    }

    // A foreign team topic is refused too.
    send_frame(
        &mut ws,
        &ClientFrame::Subscribe {
            topic: "task-created:t-9".to_string(),
        },
    )
    .await;
    match recv_frame(&mut ws).await {
        ServerFrame::Error { kind, .. } => assert_eq!(kind, ErrorKind::Forbidden),
        other => panic!("expected error frame, got {other:?}"),
    }

    // The session survives and can still subscribe to allowed topics.
    subscribe(&mut ws, "notification:u-2").await;
}

#[tokio::test]
async fn malformed_topic_answered_with_invalid_input() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &watcher).await;
    send_frame(
        &mut ws,
        &ClientFrame::Subscribe {
            topic: "task-archived:t-1".to_string(),
        },
    )
    .await;
    match recv_frame(&mut ws).await {
        ServerFrame::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidInput),
        other => panic!("expected error frame, got {other:?}"),
    }
}

#[tokio::test]
async fn admin_may_watch_foreign_teams() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-9", "t-2", "member", 600);
    let admin = issuer.mint("u-0", "t-1", "admin", 600);

    let mut ws = connect(addr, &admin).await;
    subscribe(&mut ws, "task-created:t-2").await;

    create_task(
        addr,
        &creator,
        json!({"title": "foreign", "priority": "LOW", "team_id": "t-2"}),
    )
    .await;
    assert_eq!(event_task_title(&recv_frame(&mut ws).await), "foreign");
}

#[tokio::test]
async fn assignment_notification_streams_to_assignee() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-1", "t-1", "member", 600);
    let assignee = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &assignee).await;
    subscribe(&mut ws, "notification:u-2").await;

    create_task(
        addr,
        &creator,
        json!({"title": "Write spec", "priority": "HIGH", "team_id": "t-1", "assigned_to": "u-2"}),
    )
    .await;

    match recv_frame(&mut ws).await {
        ServerFrame::Event {
            topic,
            event: EventPayload::Notification { notification },
        } => {
            assert_eq!(topic, "notification:u-2");
            assert_eq!(notification.user_id, "u-2");
            assert!(!notification.read);
        }
        other => panic!("expected notification event, got {other:?}"),
    }
}

#[tokio::test]
async fn data_event_arrives_before_derived_notification() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-1", "t-1", "member", 600);
    let assignee = issuer.mint("u-2", "t-1", "member", 600);

    let task = create_task(
        addr,
        &creator,
        json!({"title": "Write spec", "priority": "HIGH", "team_id": "t-1", "assigned_to": "u-2"}),
    )
    .await;
    let id = task["id"].as_str().unwrap();

    // One session watching both the team update stream and its own
    // notifications observes the engine's fixed publish order.
    let mut ws = connect(addr, &assignee).await;
    subscribe(&mut ws, "task-updated:t-1").await;
    subscribe(&mut ws, "notification:u-2").await;

    let response = reqwest::Client::new()
        .patch(format!("http://{addr}/tasks/{id}"))
        .bearer_auth(&creator)
        .json(&json!({"status": "IN_PROGRESS"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let first = recv_frame(&mut ws).await;
    match first {
        ServerFrame::Event {
            ref topic,
            event: EventPayload::Task { ref task },
        } => {
            assert_eq!(topic, "task-updated:t-1");
            assert_eq!(task.status.to_string(), "IN_PROGRESS");
        }
        other => panic!("expected task-updated first, got {other:?}"),
    }

    let second = recv_frame(&mut ws).await;
    match second {
        ServerFrame::Event {
            ref topic,
            event: EventPayload::Notification { .. },
        } => assert_eq!(topic, "notification:u-2"),
        other => panic!("expected notification second, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_subscribe_delivers_each_event_once() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-1", "t-1", "member", 600);
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &watcher).await;
    subscribe(&mut ws, "task-created:t-1").await;
    subscribe(&mut ws, "task-created:t-1").await; // acked, not re-registered

    create_task(
        addr,
        &creator,
        json!({"title": "a", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;
    create_task(
        addr,
        &creator,
        json!({"title": "b", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;

    // If the duplicate subscribe had registered twice, "a" would arrive
    // twice and the second receive would not be "b".
    assert_eq!(event_task_title(&recv_frame(&mut ws).await), "a");
    assert_eq!(event_task_title(&recv_frame(&mut ws).await), "b");
}

#[tokio::test]
async fn deletion_tombstone_streams_to_team() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-1", "t-1", "member", 600);
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let task = create_task(
        addr,
        &creator,
        json!({"title": "Doomed", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;
    let id = task["id"].as_str().unwrap();

    let mut ws = connect(addr, &watcher).await;
    subscribe(&mut ws, "task-deleted:t-1").await;

    reqwest::Client::new()
        .delete(format!("http://{addr}/tasks/{id}"))
        .bearer_auth(&creator)
        .send()
        .await
        .unwrap();

    match recv_frame(&mut ws).await {
        ServerFrame::Event {
            event: EventPayload::TaskDeleted { task_id },
            ..
        } => assert_eq!(task_id.to_string(), id),
        other => panic!("expected tombstone event, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_releases_subscriptions() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    let creator = issuer.mint("u-1", "t-1", "member", 600);
    let watcher = issuer.mint("u-2", "t-1", "member", 600);

    let mut ws = connect(addr, &watcher).await;
    subscribe(&mut ws, "task-created:t-1").await;
    ws.close(None).await.unwrap();
    drop(ws);

    // Give the session task a moment to tear down, then mutate; nothing
    // should be left holding the subscription (the engine publish simply
    // finds no subscribers).
    tokio::time::sleep(Duration::from_millis(100)).await;
    create_task(
        addr,
        &creator,
        json!({"title": "after-close", "priority": "LOW", "team_id": "t-1"}),
    )
    .await;
}

#[tokio::test]
async fn expired_token_forces_session_close() {
    let issuer = TestIssuer::new();
    let addr = start_gateway(&issuer).await;
    // Valid now, expires in ~2 seconds.
    let watcher = issuer.mint("u-2", "t-1", "member", 2);

    let mut ws = connect(addr, &watcher).await;
    subscribe(&mut ws, "task-created:t-1").await;

    let frame = tokio::time::timeout(Duration::from_secs(5), recv_frame(&mut ws)).await;
    match frame {
        Ok(ServerFrame::Error { kind, .. }) => assert_eq!(kind, ErrorKind::Unauthenticated),
        other => panic!("expected unauthenticated error before close, got {other:?}"),
    }

    // The server closes the stream after the error frame.
    let end = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                None => break,
                Some(Ok(tungstenite::Message::Close(_))) => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(end.is_ok(), "stream should close after token expiry");
}
