//! Subscription sessions: per-connection topic registry and fan-out delivery.
//!
//! Each upgraded WebSocket becomes one session carrying the verified claims
//! of its connection. The session authorizes every subscribe against those
//! claims before registering with the event bus, funnels all its topics
//! through a single bounded queue (so events arrive in engine publish
//! order), and releases every registration on disconnect. A token expiring
//! mid-connection forces the session closed at the expiry deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};

use taskwire_proto::error::ErrorKind;
use taskwire_proto::stream::{self, ClientFrame, ServerFrame};
use taskwire_proto::topic::Topic;

use crate::auth::Claims;
use crate::bus::{BusEvent, EventBus, SubscriberId};

/// Capacity of the per-connection outbound frame queue.
const OUTBOUND_BUFFER: usize = 64;

/// Checks a subscription request against the connection's identity.
///
/// `notification:<user>` requires the claim's subject to match;
/// team-scoped topics require the claim's team or an admin role.
///
/// # Errors
///
/// Returns [`ErrorKind::Forbidden`] when the identity may not observe
/// the topic.
pub fn authorize_subscription(claims: &Claims, topic: &Topic) -> Result<(), ErrorKind> {
    let allowed = match topic {
        Topic::Notification(user) => user == &claims.sub,
        Topic::TaskCreated(team) | Topic::TaskUpdated(team) | Topic::TaskDeleted(team) => {
            team == &claims.team_id || claims.is_admin()
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(ErrorKind::Forbidden)
    }
}

/// Upper bound on a single expiry-timer arm. Long-lived tokens re-arm the
/// timer instead of sleeping for years (which the runtime rejects).
const EXPIRY_CHECK_CAP: Duration = Duration::from_secs(60 * 60 * 24);

/// Seconds until the claim's expiry, zero if already past.
fn secs_until_expiry(claims: &Claims) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    claims.exp.saturating_sub(now)
}

/// How long the session's expiry timer should wait before checking again.
fn expiry_wait(claims: &Claims) -> Duration {
    Duration::from_secs(secs_until_expiry(claims)).min(EXPIRY_CHECK_CAP)
}

/// Handles an upgraded WebSocket connection for a single authenticated
/// client.
///
/// The connection lifecycle:
/// 1. Spawn a writer task forwarding queued frames to the socket.
/// 2. Run the session loop: client frames, bus events, expiry deadline.
/// 3. On exit, release every subscription the connection held.
pub async fn handle_socket(socket: WebSocket, claims: Claims, bus: Arc<EventBus>) {
    let (mut ws_sender, ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel::<BusEvent>(OUTBOUND_BUFFER);

    let subscriptions: Arc<Mutex<HashMap<String, SubscriberId>>> =
        Arc::new(Mutex::new(HashMap::new()));

    tracing::info!(user = %claims.sub, team = %claims.team_id, "session opened");

    // Writer task: forwards frames from the outbound queue to the socket.
    let writer_user = claims.sub.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let text = match stream::encode_server(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(user = %writer_user, error = %e, "failed to encode frame");
                    continue;
                }
            };
            if ws_sender
                .send(Message::Text(Utf8Bytes::from(text)))
                .await
                .is_err()
            {
                tracing::debug!(user = %writer_user, "WebSocket write failed");
                break;
            }
        }
        // Drain ended: close the socket politely.
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // Session loop: client frames, bus events, and the expiry deadline.
    let session_claims = claims.clone();
    let session_bus = Arc::clone(&bus);
    let session_subs = Arc::clone(&subscriptions);
    let mut session_task = tokio::spawn(async move {
        run_session(
            ws_receiver,
            event_rx,
            event_tx,
            out_tx,
            session_claims,
            session_bus,
            session_subs,
        )
        .await;
    });

    // Wait for either task to finish, then wind down the other. A finished
    // session drops its queue sender, so the writer gets a short grace
    // period to drain any final frame (e.g. the expiry error) and close.
    tokio::select! {
        _ = &mut session_task => {
            if tokio::time::timeout(Duration::from_secs(1), &mut write_task)
                .await
                .is_err()
            {
                write_task.abort();
            }
        }
        _ = &mut write_task => {
            session_task.abort();
        }
    }

    // Clean up: release every subscription this connection held.
    let mut held = subscriptions.lock().await;
    for (topic, id) in held.drain() {
        bus.unsubscribe(&topic, id).await;
    }
    drop(held);
    tracing::info!(user = %claims.sub, "session closed, subscriptions released");
}

/// The session loop for one connection.
#[allow(clippy::too_many_lines)]
async fn run_session(
    mut ws_receiver: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
    mut event_rx: mpsc::Receiver<BusEvent>,
    event_tx: mpsc::Sender<BusEvent>,
    out_tx: mpsc::Sender<ServerFrame>,
    claims: Claims,
    bus: Arc<EventBus>,
    subscriptions: Arc<Mutex<HashMap<String, SubscriberId>>>,
) {
    let expiry = tokio::time::sleep(expiry_wait(&claims));
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            // Expiry timer fired: re-arm for long-lived tokens, otherwise
            // fail the session at this message boundary.
            () = &mut expiry => {
                if secs_until_expiry(&claims) > 0 {
                    expiry.as_mut().reset(tokio::time::Instant::now() + expiry_wait(&claims));
                    continue;
                }
                tracing::info!(user = %claims.sub, "token expired, closing session");
                let _ = out_tx
                    .send(ServerFrame::Error {
                        kind: ErrorKind::Unauthenticated,
                        message: "token expired".to_string(),
                    })
                    .await;
                break;
            }

            // An event arrived on one of the subscribed topics.
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                if out_tx
                    .send(ServerFrame::Event {
                        topic: event.topic,
                        event: event.event,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }

            // A frame arrived from the client.
            msg = ws_receiver.next() => {
                let Some(Ok(msg)) = msg else {
                    tracing::debug!(user = %claims.sub, "socket closed by peer");
                    break;
                };
                match msg {
                    Message::Text(text) => {
                        let frame = match stream::decode_client(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::warn!(user = %claims.sub, error = %e, "bad client frame");
                                let _ = out_tx
                                    .send(ServerFrame::Error {
                                        kind: ErrorKind::InvalidInput,
                                        message: format!("unrecognized frame: {e}"),
                                    })
                                    .await;
                                continue;
                            }
                        };
                        handle_client_frame(
                            frame,
                            &claims,
                            &bus,
                            &event_tx,
                            &out_tx,
                            &subscriptions,
                        )
                        .await;
                    }
                    Message::Close(_) => {
                        tracing::debug!(user = %claims.sub, "received close frame");
                        break;
                    }
                    _ => {
                        // Ignore binary, ping, pong frames.
                    }
                }
            }
        }
    }
}

/// Applies one decoded client frame to the session state.
async fn handle_client_frame(
    frame: ClientFrame,
    claims: &Claims,
    bus: &Arc<EventBus>,
    event_tx: &mpsc::Sender<BusEvent>,
    out_tx: &mpsc::Sender<ServerFrame>,
    subscriptions: &Arc<Mutex<HashMap<String, SubscriberId>>>,
) {
    match frame {
        ClientFrame::Subscribe { topic } => {
            let parsed: Topic = match topic.parse() {
                Ok(parsed) => parsed,
                Err(e) => {
                    let _ = out_tx
                        .send(ServerFrame::Error {
                            kind: ErrorKind::InvalidInput,
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            };
            if let Err(kind) = authorize_subscription(claims, &parsed) {
                tracing::warn!(user = %claims.sub, topic = %topic, "subscription refused");
                let _ = out_tx
                    .send(ServerFrame::Error {
                        kind,
                        message: format!("not authorized for {topic}"),
                    })
                    .await;
                return;
            }

            let mut held = subscriptions.lock().await;
            if !held.contains_key(&topic) {
                let id = bus.subscribe_with(&topic, event_tx.clone()).await;
                held.insert(topic.clone(), id);
            }
            drop(held);
            tracing::debug!(user = %claims.sub, topic = %topic, "subscribed");
            let _ = out_tx.send(ServerFrame::Subscribed { topic }).await;
        }
        ClientFrame::Unsubscribe { topic } => {
            let mut held = subscriptions.lock().await;
            if let Some(id) = held.remove(&topic) {
                bus.unsubscribe(&topic, id).await;
            }
            drop(held);
            tracing::debug!(user = %claims.sub, topic = %topic, "unsubscribed");
            let _ = out_tx.send(ServerFrame::Unsubscribed { topic }).await;
        }
    }
}
