//! Push channel: one [`EventRelay`] subscription per WebSocket connection.
//!
//! Outgoing frames are serialized [`SyncEvent`]s. The client may send
//! `{"type":"select","guildId":..,"channelId":..}` at any time to replace
//! its subscription filter.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use guildhall_core::{ClientFrame, ClientId, EventRelay, SubscriptionFilter};

use crate::service::DashboardService;

/// Upgrades the request and serves the push channel.
pub async fn push_handler(
    ws: WebSocketUpgrade,
    State(service): State<Arc<DashboardService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let relay = service.relay().clone();
    let shutdown = service.shutdown_token().clone();
    let client_id = service.next_client_id();
    debug!(remote_addr = %addr, client_id = %client_id, "New push connection request");
    ws.on_upgrade(move |socket| serve_push(socket, relay, client_id, shutdown))
}

async fn serve_push(
    socket: WebSocket,
    relay: Arc<EventRelay>,
    client_id: ClientId,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subscription = relay.subscribe(client_id.clone(), SubscriptionFilter::default());
    info!(client_id = %client_id, "Push connection established");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!(client_id = %client_id, "Subscription replaced, closing connection");
                    break;
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Failed to serialize event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    warn!(client_id = %client_id, "Failed to send event, connection closed");
                    break;
                }
            }

            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientFrame>(text.as_str()) {
                        Ok(frame) => {
                            let filter = SubscriptionFilter::from(frame);
                            debug!(
                                client_id = %client_id,
                                guild_id = ?filter.guild_id,
                                channel_id = ?filter.channel_id,
                                "Selection changed"
                            );
                            relay.update_filter(&client_id, filter);
                        }
                        Err(e) => {
                            debug!(client_id = %client_id, error = %e, "Ignoring unknown client frame");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(client_id = %client_id, "Push connection closed by client");
                    break;
                }
                Some(Ok(_)) => trace!(client_id = %client_id, "Ignoring non-text frame"),
                Some(Err(e)) => {
                    warn!(client_id = %client_id, error = %e, "Push connection error");
                    break;
                }
            },
        }
    }

    relay.unsubscribe(&client_id);
    info!(client_id = %client_id, "Push connection closed");
}
