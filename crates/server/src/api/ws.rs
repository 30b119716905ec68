//! WebSocket support for live library and chapter updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use atlas_core::{LibraryStore, StoreEvent};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients for real-time updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A novel was added, updated or its progress saved.
    NovelUpdated { novel_id: String },
    /// A novel was deleted.
    NovelDeleted { novel_id: String },
    /// The chapter list or a cached chapter of a novel changed.
    ChaptersUpdated { novel_id: String },
    /// Stale previews were removed.
    PreviewsSwept { count: usize },
}

impl WsMessage {
    fn type_label(&self) -> &'static str {
        match self {
            WsMessage::NovelUpdated { .. } => "novel_updated",
            WsMessage::NovelDeleted { .. } => "novel_deleted",
            WsMessage::ChaptersUpdated { .. } => "chapters_updated",
            WsMessage::PreviewsSwept { .. } => "previews_swept",
        }
    }
}

impl From<StoreEvent> for WsMessage {
    fn from(event: StoreEvent) -> Self {
        match event {
            StoreEvent::NovelChanged { novel_id } => WsMessage::NovelUpdated { novel_id },
            StoreEvent::NovelDeleted { novel_id } => WsMessage::NovelDeleted { novel_id },
            StoreEvent::ChaptersChanged { novel_id } => WsMessage::ChaptersUpdated { novel_id },
            StoreEvent::PreviewsSwept { count } => WsMessage::PreviewsSwept { count },
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // No receivers just means no client is connected
        let _ = self.sender.send(msg);
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Forward every store change to connected clients.
    ///
    /// The task ends when the store is dropped.
    pub fn forward_store_events(&self, store: &Arc<dyn LibraryStore>) -> JoinHandle<()> {
        let mut events = store.subscribe();
        let broadcaster = self.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => broadcaster.broadcast(WsMessage::from(event)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Store event forwarder lagged, skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Store event channel closed");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.type_label()]).inc();

                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize WsMessage: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Clients only listen; incoming frames are drained until close
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Received text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
