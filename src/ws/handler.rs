//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ClientMsg;
use crate::ws::session::Session;

/// WebSocket upgrade handler. Connections carry no credentials; the socket
/// itself is the client's identity.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Outbound queue: session replies and room broadcasts land here in
    // mutation order; the writer task drains it onto the socket.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(state.rooms.clone(), outbound_tx);
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(client_id = ?session.client_id(), "Rate limited inbound message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => session.handle_message(msg),
                    Err(e) => {
                        // Malformed or unknown messages are dropped, never fatal
                        warn!(error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!("Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(client_id = ?session.client_id(), "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Transport close is a first-class leave
    session.handle_disconnect();
    writer_handle.abort();

    info!("WebSocket connection closed");
}
