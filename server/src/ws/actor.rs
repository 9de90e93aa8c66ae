use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::state::AppState;
use crate::ws::heartbeat::{Heartbeat, HeartbeatEvent};
use crate::ws::protocol::{self, ServerFrame};
use crate::ws::{presence, Connection};

/// Why a connection's actor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    PeerClosed,
    StreamEnded,
    ReceiveError,
    PongTimeout,
    TransportDead,
}

/// Run the actor-per-connection pattern for a freshly upgraded WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - This task: reads frames, drives the heartbeat, and dispatches to the protocol handlers
///
/// The connection starts anonymous. It only enters the registry once an
/// `auth` frame succeeds, and leaves it (with a roster rebroadcast) on close,
/// pong timeout or transport failure.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let conn = Connection::new(tx);

    tracing::info!(conn_id = %conn.id(), "WebSocket actor started");

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));
    let mut heartbeat = Heartbeat::new(state.heartbeat);

    // Inbound frames are polled first so a pong already queued on the socket
    // is seen before its deadline is checked.
    let reason = loop {
        tokio::select! {
            biased;

            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    protocol::handle_text_message(text.as_str(), &conn, &state).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    let _ = conn.send_frame(&ServerFrame::error("Binary frames are not supported"));
                }
                Some(Ok(Message::Pong(_))) => {
                    heartbeat.pong_received();
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = conn.send(Message::Pong(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        conn_id = %conn.id(),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break CloseReason::PeerClosed;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        conn_id = %conn.id(),
                        error = %e,
                        "WebSocket receive error"
                    );
                    break CloseReason::ReceiveError;
                }
                None => break CloseReason::StreamEnded,
            },

            _ = &mut writer_handle => break CloseReason::TransportDead,

            event = heartbeat.next_event() => match event {
                HeartbeatEvent::Ping => {
                    if let Err(RelayError::TransportDead) = conn.send(Message::Ping(Vec::new().into())) {
                        break CloseReason::TransportDead;
                    }
                }
                HeartbeatEvent::TimedOut => {
                    tracing::warn!(conn_id = %conn.id(), "Pong timeout, terminating connection");
                    break CloseReason::PongTimeout;
                }
            },
        }
    };

    // Terminate the transport: the sink goes with the writer task, the
    // stream with the reader half.
    writer_handle.abort();
    drop(ws_receiver);
    drop(heartbeat);

    if state.connections.unregister(&conn) {
        presence::broadcast_roster(&state).await;
    }

    tracing::info!(
        conn_id = %conn.id(),
        user_id = conn.identity().map(|identity| identity.id.as_str()).unwrap_or("-"),
        reason = ?reason,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // Sink is broken
            break;
        }
    }
}
