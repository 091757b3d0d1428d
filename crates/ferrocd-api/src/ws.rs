//! WebSocket notification endpoint.
//!
//! A client connects to `/api/v1/ws?user_id=<id>`. The handshake opens a
//! session for that user and checks a subscription out of the shared pool;
//! either failing rejects the upgrade with the mapped HTTP status. Once
//! upgraded, every message the connection's listener delivers is written as
//! one JSON text frame.

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use ferrocd_services::{logging, Delivery, Listener};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.services.gate.open_session(&params.user_id).await?;

    let (outbound, deliveries) = mpsc::channel(state.config.notify.outbound_buffer);
    let mut listener = Listener::new(session, state.registry.clone(), outbound)
        .with_grant_resolver(state.services.gate.clone());
    listener.subscribe(&state.pool, &state.config.notify.channel).await?;

    Ok(ws.on_upgrade(move |socket| handle_ws_connection(socket, state, listener, deliveries)))
}

async fn handle_ws_connection(
    socket: WebSocket,
    state: AppState,
    listener: Listener,
    mut deliveries: mpsc::Receiver<Delivery>,
) {
    let user_id = listener.session().user_id().to_string();
    let handle = match listener.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            warn!(
                subsystem = logging::API,
                component = logging::WEBSOCKET,
                user_id = %user_id,
                error = %e,
                "Listener failed to start"
            );
            return;
        }
    };

    let count = state.ws_connections.fetch_add(1, Ordering::Relaxed) + 1;
    info!(
        subsystem = logging::API,
        component = logging::WEBSOCKET,
        user_id = %user_id,
        listener_id = %handle.id(),
        active = count,
        "WebSocket connection opened"
    );

    let (mut sender, mut receiver) = socket.split();
    let ping_every = state.config.ws_ping_interval();

    let mut send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // The first tick completes immediately.
        ping_interval.tick().await;
        loop {
            tokio::select! {
                delivery = deliveries.recv() => {
                    let Some(delivery) = delivery else { break };
                    match delivery.message.encode() {
                        Ok(json) => {
                            if sender.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(
                                subsystem = logging::API,
                                component = logging::WEBSOCKET,
                                message_id = %delivery.message.message_id,
                                error = %e,
                                "Failed to encode delivery"
                            );
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let WsMessage::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let listener_id = handle.id();
    handle.shutdown().await;

    let count = state.ws_connections.fetch_sub(1, Ordering::Relaxed) - 1;
    info!(
        subsystem = logging::API,
        component = logging::WEBSOCKET,
        user_id = %user_id,
        listener_id = %listener_id,
        active = count,
        "WebSocket connection closed"
    );
    debug!(
        subsystem = logging::API,
        component = logging::WEBSOCKET,
        pool_available = state.pool.available(),
        "Subscription returned to pool"
    );
}
