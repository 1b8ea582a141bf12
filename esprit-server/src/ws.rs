use crate::state::AppState;
use crate::subscriber::WsSubscriber;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use esprit_fanout::Subscriber;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// How long a connection may go without a client-originated read before a
/// `heartbeat` frame is pushed to keep intermediaries from closing it idle.
const HEARTBEAT_IDLE: Duration = Duration::from_secs(30);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::debug!("dashboard client connected");
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<serde_json::Value>();
    let subscriber: Arc<dyn Subscriber> = Arc::new(WsSubscriber::new(tx.clone()));

    state.bridge.send_full_state_to(&subscriber).await;
    let subscriber_id = state.bridge.subscribe(subscriber);

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let text = match serde_json::to_string(&payload) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let heartbeat_tx = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            match tokio::time::timeout(HEARTBEAT_IDLE, ws_receiver.next()).await {
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) => break,
                Err(_elapsed) => {
                    if heartbeat_tx.send(serde_json::json!({ "type": "heartbeat" })).is_err() {
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.bridge.unsubscribe(subscriber_id);
    tracing::debug!("dashboard client disconnected");
}
