use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::api::{ApiError, QueryParams, SharedState};
use super::auth::CurrentUser;
use super::models::*;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    TaskCreated { task: Task },
    TaskUpdated { task: Task },
    TaskDeleted { id: i64 },
    TasksReordered { updates: Vec<PositionUpdate> },

    ProjectCreated { project: Project },
    ProjectUpdated { project: Project },
    ProjectDeleted { id: i64 },

    WorkspaceUpdated { workspace: Workspace },
    WorkspaceDeleted { id: i64 },

    MemberJoined { member: Member },
    MemberRemoved { id: i64 },
    MemberRoleChanged { member: Member },
}

impl WsMessage {
    /// Access this event takes away from open sockets.
    fn revocation(&self) -> Option<Revocation> {
        match self {
            WsMessage::MemberRemoved { id } => Some(Revocation::Member(*id)),
            WsMessage::WorkspaceDeleted { .. } => Some(Revocation::Workspace),
            _ => None,
        }
    }
}

/// Subscribers an event cuts off once it has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    /// The membership with this id is gone.
    Member(i64),
    /// The whole workspace is gone.
    Workspace,
}

/// A serialized [`WsMessage`] tagged with the workspace it concerns.
#[derive(Debug, Clone)]
pub struct BoardEvent {
    pub workspace_id: i64,
    pub payload: String,
    pub revokes: Option<Revocation>,
}

impl BoardEvent {
    /// Payload to forward to a socket subscribed to `workspace_id`.
    fn payload_for(&self, workspace_id: i64) -> Option<&str> {
        (self.workspace_id == workspace_id).then_some(self.payload.as_str())
    }

    /// Whether a socket held by `member_id` must close after this event.
    fn ends_subscription(&self, member_id: i64) -> bool {
        match self.revokes {
            Some(Revocation::Workspace) => true,
            Some(Revocation::Member(id)) => id == member_id,
            None => false,
        }
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WsQuery {
    pub workspace_id: i64,
}

/// Upgrade to a change feed for one workspace. Members only; the socket is
/// closed when that membership or the workspace goes away.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    QueryParams(query): QueryParams<WsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace_id = query.workspace_id;
    // Subscribe before the membership check so a removal racing the upgrade
    // is still seen by the loop.
    let rx = state.ws_tx.subscribe();
    let member = state
        .db
        .call(move |db| {
            db.require_workspace(workspace_id)?;
            db.require_member(workspace_id, user.id)
        })
        .await?;
    let member_id = member.id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, rx, workspace_id, member_id)))
}

async fn handle_socket(
    socket: WebSocket,
    rx: broadcast::Receiver<BoardEvent>,
    workspace_id: i64,
    member_id: i64,
) {
    debug!(workspace_id, member_id, "WebSocket connected");
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx, workspace_id, member_id).await;
    debug!(workspace_id, member_id, "WebSocket closed");
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Forwards broadcast events for `workspace_id`, watches client frames for
/// pongs and close, and pings every [`PING_INTERVAL`]. If no Pong arrives
/// within [`PONG_TIMEOUT`] of a Ping the connection is dropped. An event that
/// revokes `member_id`'s access is delivered and then the socket is closed.
async fn run_socket_loop<S, R, E>(
    mut sender: S,
    mut receiver: R,
    mut rx: broadcast::Receiver<BoardEvent>,
    workspace_id: i64,
    member_id: i64,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!(workspace_id, member_id, "WebSocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let Some(payload) = event.payload_for(workspace_id) else {
                            continue;
                        };
                        if sender.send(Message::Text(payload.to_owned().into())).await.is_err() {
                            break;
                        }
                        if event.ends_subscription(member_id) {
                            debug!(workspace_id, member_id, "WebSocket access revoked");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // A skipped event may have revoked access; the client
                        // reconnects and is checked again.
                        warn!(workspace_id, skipped, "WebSocket subscriber lagged, closing");
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage to sockets watching `workspace_id`.
/// Returns silently even if no clients are connected.
pub fn broadcast_message(tx: &broadcast::Sender<BoardEvent>, workspace_id: i64, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(payload) => {
            let _ = tx.send(BoardEvent {
                workspace_id,
                payload,
                revokes: msg.revocation(),
            });
        }
        Err(e) => warn!(error = %e, "Failed to serialize WsMessage"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    /// A socket loop driven through in-memory channels.
    struct TestSocket {
        /// Frames the server wrote.
        sent: mpsc::UnboundedReceiver<Message>,
        /// Frames arriving from the client.
        client: mpsc::UnboundedSender<Message>,
        task: JoinHandle<()>,
    }

    fn open_socket(
        tx: &broadcast::Sender<BoardEvent>,
        workspace_id: i64,
        member_id: i64,
    ) -> TestSocket {
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let (client, client_rx) = mpsc::unbounded_channel();
        let sender = Box::pin(sink::unfold(
            sent_tx,
            |sent_tx: mpsc::UnboundedSender<Message>, msg: Message| async move {
                let _ = sent_tx.send(msg);
                Ok::<_, axum::Error>(sent_tx)
            },
        ));
        let receiver = Box::pin(stream::unfold(client_rx, |mut client_rx| async move {
            let msg = client_rx.recv().await?;
            Some((Ok::<_, axum::Error>(msg), client_rx))
        }));
        let rx = tx.subscribe();
        let task = tokio::spawn(run_socket_loop(sender, receiver, rx, workspace_id, member_id));
        TestSocket { sent, client, task }
    }

    impl TestSocket {
        /// Next non-ping frame.
        async fn next_frame(&mut self) -> Option<Message> {
            loop {
                match self.sent.recv().await? {
                    Message::Ping(_) => continue,
                    frame => return Some(frame),
                }
            }
        }

        async fn next_text(&mut self) -> String {
            match self.next_frame().await {
                Some(Message::Text(text)) => text.as_str().to_owned(),
                other => panic!("expected a text frame, got {other:?}"),
            }
        }

        async fn expect_closed(mut self) {
            assert!(matches!(self.next_frame().await, Some(Message::Close(None))));
            self.task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_socket_forwards_only_its_workspace() {
        let (tx, _rx) = broadcast::channel(16);
        let mut socket = open_socket(&tx, 1, 10);

        broadcast_message(&tx, 2, &WsMessage::ProjectDeleted { id: 20 });
        broadcast_message(&tx, 1, &WsMessage::ProjectDeleted { id: 10 });

        let text = socket.next_text().await;
        assert!(text.contains("\"ProjectDeleted\""));
        assert!(text.contains("\"id\":10"));
        assert!(!socket.task.is_finished());
    }

    #[tokio::test]
    async fn test_removed_member_socket_is_closed() {
        let (tx, _rx) = broadcast::channel(16);
        let mut removed = open_socket(&tx, 1, 11);
        let mut remaining = open_socket(&tx, 1, 10);

        broadcast_message(&tx, 1, &WsMessage::MemberRemoved { id: 11 });

        assert!(removed.next_text().await.contains("\"MemberRemoved\""));
        removed.expect_closed().await;

        assert!(remaining.next_text().await.contains("\"MemberRemoved\""));
        broadcast_message(&tx, 1, &WsMessage::ProjectDeleted { id: 3 });
        assert!(remaining.next_text().await.contains("\"ProjectDeleted\""));
        assert!(!remaining.task.is_finished());
    }

    #[tokio::test]
    async fn test_workspace_deletion_closes_its_sockets() {
        let (tx, _rx) = broadcast::channel(16);
        let mut first = open_socket(&tx, 1, 10);
        let mut second = open_socket(&tx, 1, 11);
        let mut elsewhere = open_socket(&tx, 2, 30);

        broadcast_message(&tx, 1, &WsMessage::WorkspaceDeleted { id: 1 });

        assert!(first.next_text().await.contains("\"WorkspaceDeleted\""));
        first.expect_closed().await;
        assert!(second.next_text().await.contains("\"WorkspaceDeleted\""));
        second.expect_closed().await;

        // a membership id colliding with another workspace's removal is ignored
        broadcast_message(&tx, 1, &WsMessage::MemberRemoved { id: 30 });
        broadcast_message(&tx, 2, &WsMessage::ProjectDeleted { id: 4 });
        assert!(elsewhere.next_text().await.contains("\"id\":4"));
        assert!(!elsewhere.task.is_finished());
    }

    #[tokio::test]
    async fn test_client_close_ends_loop() {
        let (tx, _rx) = broadcast::channel(16);
        let socket = open_socket(&tx, 1, 10);
        socket.client.send(Message::Close(None)).unwrap();
        socket.expect_closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_times_out() {
        let (tx, _rx) = broadcast::channel(16);
        let TestSocket {
            mut sent,
            client: _client,
            task,
        } = open_socket(&tx, 1, 10);
        let started = Instant::now();

        tokio::time::timeout(Duration::from_secs(600), task)
            .await
            .expect("socket should time out")
            .unwrap();
        assert!(started.elapsed() > PONG_TIMEOUT);

        let mut frames = Vec::new();
        while let Ok(frame) = sent.try_recv() {
            frames.push(frame);
        }
        assert!(frames.iter().any(|f| matches!(f, Message::Ping(_))));
        assert!(matches!(frames.last(), Some(Message::Close(None))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_pings_keep_socket_open() {
        let (tx, _rx) = broadcast::channel(16);
        let mut socket = open_socket(&tx, 1, 10);

        // well past PONG_TIMEOUT
        for _ in 0..5 {
            match socket.sent.recv().await {
                Some(Message::Ping(_)) => socket
                    .client
                    .send(Message::Pong(Vec::new().into()))
                    .unwrap(),
                other => panic!("expected a ping, got {other:?}"),
            }
        }
        assert!(!socket.task.is_finished());
    }

    fn sample_task() -> Task {
        Task {
            id: 7,
            workspace_id: 1,
            project_id: 2,
            assignee_id: Some(3),
            name: "Ship it".to_string(),
            description: None,
            status: TaskStatus::InReview,
            due_date: "2030-01-01 00:00:00".to_string(),
            position: 2000,
            created_at: "2025-01-01 00:00:00".to_string(),
            updated_at: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_ws_message_task_created_serialization() {
        let msg = WsMessage::TaskCreated {
            task: sample_task(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"TaskCreated\""));
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"status\":\"IN_REVIEW\""));
    }

    #[test]
    fn test_ws_message_tasks_reordered_serialization() {
        let msg = WsMessage::TasksReordered {
            updates: vec![PositionUpdate {
                id: 7,
                status: TaskStatus::Done,
                position: 1000,
            }],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "TasksReordered");
        assert_eq!(value["data"]["updates"][0]["status"], "DONE");
        assert_eq!(value["data"]["updates"][0]["position"], 1000);
    }

    #[test]
    fn test_broadcast_message_tags_workspace() {
        let (tx, mut rx) = broadcast::channel(4);
        broadcast_message(&tx, 9, &WsMessage::ProjectDeleted { id: 4 });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.workspace_id, 9);
        assert!(event.payload.contains("\"ProjectDeleted\""));
        assert!(event.payload_for(9).is_some());
        assert!(event.payload_for(10).is_none());
        assert_eq!(event.revokes, None);
    }

    #[test]
    fn test_revoking_events() {
        let (tx, mut rx) = broadcast::channel(4);
        broadcast_message(&tx, 1, &WsMessage::MemberRemoved { id: 5 });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.revokes, Some(Revocation::Member(5)));
        assert!(event.ends_subscription(5));
        assert!(!event.ends_subscription(6));

        broadcast_message(&tx, 1, &WsMessage::WorkspaceDeleted { id: 1 });
        let event = rx.try_recv().unwrap();
        assert!(event.ends_subscription(5));
        assert!(event.ends_subscription(6));
    }

    #[test]
    fn test_broadcast_without_receivers_is_silent() {
        let (tx, rx) = broadcast::channel::<BoardEvent>(4);
        drop(rx);
        broadcast_message(&tx, 1, &WsMessage::WorkspaceDeleted { id: 1 });
    }
}
