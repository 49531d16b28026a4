use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    extract::{ConnectInfo, Request, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ConnectionMeta, ErrorResponse};
use crate::services::get_auth_token;
use crate::services::Identity;
use crate::websocket::connctx::ConnCtx;
use crate::websocket::{dispatch, lifecycle};
use crate::AppState;

/// WebSocket handler. The handshake is rejected unless it carries a valid token.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    req: Request,
) -> Response {
    info!("New WebSocket connection attempt");

    let identity = match get_auth_token(&req)
        .map_err(|e| e.to_string())
        .and_then(|token| state.identities.resolve(&token).map_err(|e| e.to_string()))
    {
        Ok(identity) => identity,
        Err(e) => {
            warn!("WebSocket handshake rejected: {}", e);
            let status = StatusCode::UNAUTHORIZED;
            return (status, Json(ErrorResponse {
                code: status.as_u16(),
                status: status.to_string(),
                error: e,
            })).into_response();
        }
    };

    let meta = ConnectionMeta {
        address: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string()),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, meta))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity, meta: ConnectionMeta) {

    // Generate unique connection ID to identify this client
    let ctx = ConnCtx::new(Uuid::new_v4(), identity);
    info!("WebSocket connection established for user {} with connection_id: {}", ctx.user_id(), ctx.connection_id);

    // Everything addressed to this connection goes through one channel
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    lifecycle::on_connect(&state, &ctx, tx, meta).await;

    let (mut sender, mut receiver) = socket.split();

    // Forward outbound frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Handle inbound frames one at a time
    let recv_state = state.clone();
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => dispatch::handle_frame(&recv_state, &recv_ctx, &text).await,
                Message::Close(_) => break,
                _ => debug!("Ignoring non-text frame from {}", recv_ctx.connection_id),
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    lifecycle::on_disconnect(&state, &ctx).await;
    info!("WebSocket connection terminated");
}
