//! WebSocket handler for real-time hub events

use std::time::Duration;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{
    SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{actors::messages::HubEvent, api::state::ApiState};

/// A client that does not accept a frame within this time is disconnected
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Send one frame; `false` means the client is gone
async fn send_text(sender: &mut SplitSink<WebSocket, Message>, text: String) -> bool {
    match tokio::time::timeout(SEND_TIMEOUT, sender.send(Message::Text(text))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("WebSocket send failed, client disconnected: {e}");
            false
        }
        Err(_) => {
            warn!("WebSocket client did not accept a frame within {SEND_TIMEOUT:?}, disconnecting");
            false
        }
    }
}

/// Handle WebSocket connection
///
/// The client first receives the current graph, then every published event.
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    // subscribe before the snapshot so nothing published in between is lost
    let mut events = state.dispatcher.subscribe();
    let initial = HubEvent::GraphUpdate(state.aggregator.snapshot());

    let mut send_task = tokio::spawn(async move {
        match serde_json::to_string(&initial) {
            Ok(text) => {
                if !send_text(&mut sender, text).await {
                    return;
                }
            }
            Err(e) => warn!("failed to serialize initial graph: {e}"),
        }

        loop {
            match events.recv().await {
                Ok(text) => {
                    if !send_text(&mut sender, text.to_string()).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagging behind, skipped {skipped} events");
                }
                Err(RecvError::Closed) => {
                    debug!("event channel closed");
                    break;
                }
            }
        }

        let _ = sender.close().await;
    });

    // inbound frames carry nothing; only watch for the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket client disconnected");
}
