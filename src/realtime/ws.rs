use std::time::Duration;

use axum::{
    extract::{
        Extension, Query,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::db::PollId;
use crate::realtime::broadcaster::Broadcaster;
use crate::realtime::connection::{Connection, Frame};
use crate::startup::AppState;

const PING: &str = "ping";
const PONG: &str = "pong";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub poll_id: Option<PollId>,
}

/// `GET /ws[?poll_id=N]`. Without a poll id the client follows the global feed.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    Extension(app_state): Extension<AppState>,
) -> impl IntoResponse {
    let broadcaster = app_state.events.broadcaster().clone();
    let send_queue = app_state.config.realtime.send_queue;
    let idle_timeout = app_state.config.realtime.idle_timeout;

    ws.on_upgrade(move |socket| {
        handle_socket(socket, broadcaster, query.poll_id, send_queue, idle_timeout)
    })
}

async fn handle_socket(
    socket: WebSocket,
    broadcaster: Broadcaster,
    poll_id: Option<PollId>,
    send_queue: usize,
    idle_timeout: Option<Duration>,
) {
    let (connection, rx) = Connection::open(send_queue);
    let connection_id = connection.id();
    let replies = connection.downgrade();

    if let Err(e) = broadcaster.connect(connection, poll_id) {
        error!(connection_id = %connection_id, "WebSocket registration failed: {e}");
        return;
    }

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, rx));
    let mut reader = tokio::spawn(read_loop(ws_rx, replies, idle_timeout));

    // Either side ending closes the connection. The writer ends when the
    // registry drops our queue (pruned or shutdown) or the socket errors.
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    broadcaster.disconnect(&connection_id);
    info!(connection_id = %connection_id, poll_id = ?poll_id, "WebSocket closed");
}

async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = ws_tx.send(Message::Text(frame.to_string())).await {
            debug!("WebSocket send failed: {e}");
            return;
        }
    }
    let _ = ws_tx.close().await;
}

async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    replies: mpsc::WeakSender<Frame>,
    idle_timeout: Option<Duration>,
) {
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, ws_rx.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!("WebSocket idle for {limit:?}, evicting");
                    return;
                }
            },
            None => ws_rx.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if text == PING {
                    let Some(tx) = replies.upgrade() else {
                        return;
                    };
                    if let Err(e) = tx.try_send(Frame::from(PONG)) {
                        warn!("Could not queue pong: {e}");
                    }
                }
                debug!("Received message: {text}");
            }
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket error: {e}");
                return;
            }
        }
    }
}
