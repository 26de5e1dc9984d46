use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use super::extract::AllowedOrigin;
use super::state::AppState;
use crate::broadcast::StatusBroadcaster;
use crate::session::SessionUser;

/// `GET /ws`: upgrade to the live job status stream.
///
/// The session and origin extractors run before the upgrade, so a refused
/// client never reaches the connection registry.
pub async fn stream_status(
    State(state): State<AppState>,
    user: SessionUser,
    AllowedOrigin(origin): AllowedOrigin,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(email = %user.email, origin = %origin, "Upgrading status stream");
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster, user))
}

/// Serve one connection until the client leaves or the broadcaster drops it.
///
/// Outbound frames come from the broadcaster's per-connection buffer; inbound
/// frames are only watched for Close.
async fn handle_socket(socket: WebSocket, broadcaster: Arc<StatusBroadcaster>, user: SessionUser) {
    let (conn_id, mut rx) = broadcaster.register(user.email.clone());
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(conn_id = %conn_id, "Status stream sender finished");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    broadcaster.unregister(&conn_id);
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Status stream disconnected");
}
