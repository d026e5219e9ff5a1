//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands to the status view and forwarding
//! filtered view events. Commands that reach the store run on their own
//! task and reply through a channel, so events keep flowing meanwhile.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::api::dto::{FeedRequestDto, FeedResponse, StatusResponse};
use crate::domain::{EventKey, ViewEvent};
use crate::error::SyncError;
use crate::service::{FeedOutcome, StatusView, UndoOutcome};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    event_rx: broadcast::Receiver<ViewEvent>,
    view: Arc<StatusView>,
) {
    let (ws_tx, ws_rx) = socket.split();
    serve(ws_tx, ws_rx, event_rx, view).await;
}

/// Connection loop over any message sink and stream.
async fn serve<S, R>(
    mut ws_tx: S,
    mut ws_rx: R,
    mut event_rx: broadcast::Receiver<ViewEvent>,
    view: Arc<StatusView>,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut subs = SubscriptionManager::new();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &view, &reply_tx).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Reply of a command running on its own task
            Some(reply) = reply_rx.recv() => {
                if ws_tx.send(Message::text(reply)).await.is_err() {
                    break;
                }
            }
            // Event from EventBus
            event = event_rx.recv() => {
                match event {
                    Ok(view_event) => {
                        if let Some(json) = encode_event(&view_event, &subs)
                            && ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Wraps a view event in an event envelope if the client subscribed to
/// its type.
fn encode_event(event: &ViewEvent, subs: &SubscriptionManager) -> Option<String> {
    if !subs.matches(event.event_type_str()) {
        return None;
    }
    WsMessage::event(serde_json::to_value(event).unwrap_or_default()).to_json()
}

/// Handles a text message from the client.
///
/// Returns the reply of commands answered in place. Commands that reach
/// the store return `None` and reply later through `replies`.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    view: &Arc<StatusView>,
    replies: &mpsc::UnboundedSender<String>,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON").to_json();
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "expected a command").to_json();
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command").to_json();
    };

    let view = Arc::clone(view);
    let result = match command {
        WsCommand::Subscribe { event_types } => {
            let unknown = subs.subscribe(&event_types);
            Ok(serde_json::json!({ "subscribed": subs.active(), "unknown": unknown }))
        }
        WsCommand::Unsubscribe { event_types } => {
            let unknown = subs.unsubscribe(&event_types);
            Ok(serde_json::json!({ "subscribed": subs.active(), "unknown": unknown }))
        }
        WsCommand::GetStatus => status(&view).await,
        WsCommand::Feed { pet_ids } => {
            return spawn_reply(msg.id, replies, feed(view, FeedRequestDto { pet_ids }));
        }
        WsCommand::Undo { event_id } => {
            return spawn_reply(msg.id, replies, undo(view, event_id));
        }
        WsCommand::Reload => return spawn_reply(msg.id, replies, reload(view)),
        WsCommand::MarkNotificationsRead => {
            return spawn_reply(msg.id, replies, mark_read(view));
        }
    };
    reply(msg.id, result).to_json()
}

/// Runs `command` on its own task and queues its reply.
fn spawn_reply<F>(id: String, replies: &mpsc::UnboundedSender<String>, command: F) -> Option<String>
where
    F: Future<Output = Result<serde_json::Value, SyncError>> + Send + 'static,
{
    let replies = replies.clone();
    tokio::spawn(async move {
        if let Some(json) = reply(id, command.await).to_json() {
            // The client may be gone; the command still ran.
            let _ = replies.send(json);
        }
    });
    None
}

fn reply(id: String, result: Result<serde_json::Value, SyncError>) -> WsMessage {
    match result {
        Ok(payload) => WsMessage::response(id, payload),
        Err(err) => {
            tracing::debug!(error = %err, "ws command failed");
            WsMessage::from_sync_error(id, &err)
        }
    }
}

async fn status(view: &StatusView) -> Result<serde_json::Value, SyncError> {
    let current = view.current().await.ok_or(SyncError::NotLoaded)?;
    let status = StatusResponse::from_view(&current, view.settings().history_limit, view.now());
    serde_json::to_value(status).map_err(|e| SyncError::Internal(e.to_string()))
}

async fn feed(
    view: Arc<StatusView>,
    request: FeedRequestDto,
) -> Result<serde_json::Value, SyncError> {
    let response = match view.feed(request.targets()).await? {
        FeedOutcome::Committed(id) => FeedResponse::committed(id.into()),
        FeedOutcome::Ignored => FeedResponse::ignored(),
    };
    serde_json::to_value(response).map_err(|e| SyncError::Internal(e.to_string()))
}

async fn undo(view: Arc<StatusView>, event_id: String) -> Result<serde_json::Value, SyncError> {
    let key: EventKey = event_id
        .parse()
        .map_err(|e| SyncError::InvalidRequest(format!("invalid feeding id '{event_id}': {e}")))?;
    let status = match view.undo(key).await? {
        UndoOutcome::Undone => "undone",
        UndoOutcome::Ignored => "ignored",
    };
    Ok(serde_json::json!({ "status": status }))
}

async fn reload(view: Arc<StatusView>) -> Result<serde_json::Value, SyncError> {
    let reloaded = view.reload().await?;
    Ok(serde_json::json!({ "status": "reloaded", "refreshed_at": reloaded.refreshed_at }))
}

async fn mark_read(view: Arc<StatusView>) -> Result<serde_json::Value, SyncError> {
    let marked = view.mark_notifications_read().await?;
    Ok(serde_json::json!({ "marked": marked, "unread_notifications": 0 }))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use futures_util::{sink, stream};

    use super::*;
    use crate::app_state::testing::{Fixture, fixture};
    use crate::domain::{TempEventId, UndoStatus, UpdateReason};

    fn command(id: &str, payload: serde_json::Value) -> String {
        serde_json::json!({
            "id": id,
            "type": "command",
            "timestamp": Utc::now(),
            "payload": payload,
        })
        .to_string()
    }

    fn envelope(text: &str) -> WsMessage {
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            panic!("reply is not an envelope");
        };
        msg
    }

    async fn roundtrip(
        view: &Arc<StatusView>,
        subs: &mut SubscriptionManager,
        text: &str,
    ) -> WsMessage {
        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(reply) = handle_text_message(text, subs, view, &tx).await {
            return envelope(&reply);
        }
        let Ok(Some(reply)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await else {
            panic!("no reply");
        };
        envelope(&reply)
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let f = fixture(true).await;
        let mut subs = SubscriptionManager::new();
        let reply = roundtrip(&f.state.status_view, &mut subs, "{not json").await;
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.payload["code"], 400);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let f = fixture(true).await;
        let mut subs = SubscriptionManager::new();
        let text = command("c1", serde_json::json!({ "command": "walk_dog" }));
        let reply = roundtrip(&f.state.status_view, &mut subs, &text).await;
        assert_eq!(reply.id, "c1");
        assert_eq!(reply.payload["code"], 404);
    }

    #[tokio::test]
    async fn feed_then_status_over_commands() {
        let f = fixture(true).await;
        let mut subs = SubscriptionManager::new();
        let view = &f.state.status_view;

        let feed = command("c1", serde_json::json!({ "command": "feed" }));
        let reply = roundtrip(view, &mut subs, &feed).await;
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "c1");
        assert_eq!(reply.payload["status"], "committed");

        let get_status = command("c2", serde_json::json!({ "command": "get_status" }));
        let reply = roundtrip(view, &mut subs, &get_status).await;
        assert_eq!(reply.payload["latest"]["id"], latest_key(&f).await);
        assert_eq!(reply.payload["undo"]["available"], true);
    }

    async fn latest_key(f: &Fixture) -> serde_json::Value {
        let Some(view) = f.state.status_view.current().await else {
            panic!("view not loaded");
        };
        let Some(latest) = view.latest else {
            panic!("no latest event");
        };
        serde_json::Value::String(latest.event.key.to_string())
    }

    #[tokio::test]
    async fn undo_of_pending_id_reports_still_syncing() {
        let f = fixture(true).await;
        let mut subs = SubscriptionManager::new();
        let key = EventKey::Pending(TempEventId::new()).to_string();
        let text = command("c1", serde_json::json!({ "command": "undo", "event_id": key }));
        let reply = roundtrip(&f.state.status_view, &mut subs, &text).await;
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.payload["code"], 2001);
    }

    #[tokio::test]
    async fn mark_read_command_replies_with_count() {
        let f = fixture(true).await;
        let mut subs = SubscriptionManager::new();
        let text = command("c1", serde_json::json!({ "command": "mark_notifications_read" }));
        let reply = roundtrip(&f.state.status_view, &mut subs, &text).await;
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.payload["marked"], 0);
        assert_eq!(reply.payload["unread_notifications"], 0);
    }

    #[tokio::test]
    async fn unsubscribed_events_are_not_forwarded() {
        let f = fixture(true).await;
        let mut subs = SubscriptionManager::new();
        let text = command(
            "c1",
            serde_json::json!({ "command": "unsubscribe", "event_types": ["undo_tick"] }),
        );
        let reply = roundtrip(&f.state.status_view, &mut subs, &text).await;
        assert_eq!(reply.payload["subscribed"], serde_json::json!(["updated"]));

        let tick = ViewEvent::UndoTick {
            status: UndoStatus::unavailable(),
            timestamp: Utc::now(),
        };
        assert!(encode_event(&tick, &subs).is_none());

        let Some(view) = f.state.status_view.current().await else {
            panic!("view not loaded");
        };
        let update = ViewEvent::updated(UpdateReason::Reloaded, view);
        let Some(json) = encode_event(&update, &subs) else {
            panic!("update should be forwarded");
        };
        let msg = envelope(&json);
        assert_eq!(msg.msg_type, WsMessageType::Event);
        assert_eq!(msg.payload["event_type"], "updated");
        assert_eq!(msg.payload["reason"], "reloaded");
    }

    async fn next_frame(frames: &mut mpsc::UnboundedReceiver<Message>) -> WsMessage {
        let Ok(Some(Message::Text(text))) =
            tokio::time::timeout(Duration::from_secs(2), frames.recv()).await
        else {
            panic!("no frame sent to the client");
        };
        envelope(text.as_str())
    }

    #[tokio::test]
    async fn events_flow_while_a_feed_is_in_flight() {
        let f = fixture(true).await;
        let (client_tx, client_rx) = mpsc::unbounded_channel::<Message>();
        let (server_tx, mut frames) = mpsc::unbounded_channel::<Message>();
        let incoming = Box::pin(stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|msg| (Ok::<_, axum::Error>(msg), rx))
        }));
        let outgoing = Box::pin(sink::unfold(server_tx, |tx, msg: Message| async move {
            tx.send(msg)
                .map(|()| tx)
                .map_err(|_| axum::Error::new("client gone"))
        }));
        let connection = tokio::spawn(serve(
            outgoing,
            incoming,
            f.state.event_bus.subscribe(),
            Arc::clone(&f.state.status_view),
        ));

        f.store.hold_writes();
        let feed = command("c1", serde_json::json!({ "command": "feed" }));
        assert!(client_tx.send(Message::text(feed)).is_ok());

        // The optimistic view reaches the client while the write is held.
        let first = next_frame(&mut frames).await;
        assert_eq!(first.msg_type, WsMessageType::Event);
        assert_eq!(first.payload["reason"], "optimistic");
        assert!(!first.payload["view"]["latest"].is_null());
        assert!(frames.try_recv().is_err());

        f.store.release_writes();
        let reply = loop {
            let frame = next_frame(&mut frames).await;
            if frame.msg_type == WsMessageType::Response {
                break frame;
            }
        };
        assert_eq!(reply.id, "c1");
        assert_eq!(reply.payload["status"], "committed");

        drop(client_tx);
        assert!(connection.await.is_ok());
    }
}
