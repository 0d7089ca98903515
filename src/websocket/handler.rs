use std::sync::Arc;
use axum::{
    extract::{Extension, Path, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::auth::Identity;
use crate::db::DocumentId;
use crate::models::{encode_outbound, OutboundMessage};
use crate::state::AppState;
use crate::ws::{ConnectionActor, DisconnectReason};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// WebSocket handler
///
/// The permission gate runs before the upgrade: a denied caller gets a bare
/// 403 and never sees an open socket or an application message.
pub async fn websocket_handler(
    Path(document_id): Path<DocumentId>,
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New WebSocket connection attempt for document {}", document_id);

    let mut actor = ConnectionActor::new(
        document_id,
        identity,
        app_state.store.clone(),
        app_state.registry.clone(),
    );
    if actor.authorize().await.is_err() {
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, actor))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, mut actor: ConnectionActor) {
    let document_id = actor.document_id();

    let mut events = match actor.join() {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to join document {}: {}", document_id, e);
            return;
        }
    };
    if let Err(e) = actor.activate() {
        error!("Failed to activate connection on document {}: {}", document_id, e);
        actor.disconnect(DisconnectReason::Transport(e.to_string())).await;
        return;
    }
    info!(
        "WebSocket connection established for document {} by {}",
        document_id,
        actor.identity().display_name()
    );

    // Split the socket into sender and receiver
    let (sender, mut receiver) = socket.split();

    // Error replies and group events share the sink
    let sender1: WsSender = Arc::new(Mutex::new(sender));
    let sender2 = sender1.clone();

    // Forward group events to the client, in the order the group produced them
    let mut forward_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !send_outbound(&sender2, &OutboundMessage::from(event.as_ref())).await {
                break;
            }
        }
    });

    let reason = loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = actor.receive(&text) {
                        if e.is_recoverable() {
                            warn!("Bad message on document {}: {}", document_id, e);
                        } else {
                            error!("Failed to handle message on document {}: {}", document_id, e);
                        }
                        // Reported to the sender only
                        if !send_outbound(&sender1, &OutboundMessage::from(&e)).await {
                            break DisconnectReason::SendFailed;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => break DisconnectReason::ClientClosed(frame.map(|f| f.code)),
                // Binary frames are not part of the protocol; ping/pong is answered by axum
                Some(Ok(_)) => continue,
                Some(Err(e)) => break DisconnectReason::Transport(e.to_string()),
                None => break DisconnectReason::Transport("stream ended".to_string()),
            },
            _ = &mut forward_task => break DisconnectReason::SendFailed,
        }
    };

    forward_task.abort();
    actor.disconnect(reason).await;
    info!("WebSocket connection terminated for document {}", document_id);
}

async fn send_outbound(sender: &WsSender, msg: &OutboundMessage) -> bool {
    match encode_outbound(msg) {
        Ok(text) => sender.lock().await.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            error!("Failed to encode outbound message: {}", e);
            true
        }
    }
}
