//! Discord gateway client.
//!
//! Keeps one WebSocket session open, answers the heartbeat protocol and turns
//! channel and message dispatches into [`SyncEvent`]s for an [`EventSink`].
//!
//! | Opcode | Direction | Handling |
//! |--------|-----------|----------|
//! | 10 Hello | recv | start heartbeating, send Identify |
//! | 0 Dispatch | recv | track sequence, forward channel/message events |
//! | 1 Heartbeat | both | sent on interval; answered immediately when requested |
//! | 11 Heartbeat ACK | recv | marks the connection alive |
//! | 7 Reconnect / 9 Invalid Session | recv | drop the session and reconnect |
//!
//! Lost connections are re-established with the reconnect [`RetryPolicy`]'s
//! delays. Close codes that indicate a configuration problem end the loop.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use guildhall_core::{ChangeType, EventSink, RetryPolicy, SyncEvent};

use crate::config::DiscordConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// Gateway failures that end the connection loop.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Discord closed the session with a code that retrying cannot fix.
    #[error("gateway closed the session ({code}): {reason}")]
    Fatal {
        /// WebSocket close code.
        code: u16,
        /// Close reason sent by Discord.
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct Payload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Why a single session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect { ready: bool },
    Fatal { code: u16, reason: String },
}

/// Returns `true` for close codes after which reconnecting is pointless.
pub fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010..=4014)
}

/// Maps a dispatch onto a sync event, if it is one the dashboard tracks.
pub fn dispatch_event(event_type: &str, data: &Value) -> Option<SyncEvent> {
    let field = |name: &str| data.get(name).and_then(Value::as_str);
    let (change, is_channel) = match event_type {
        "CHANNEL_CREATE" => (ChangeType::Create, true),
        "CHANNEL_UPDATE" => (ChangeType::Update, true),
        "CHANNEL_DELETE" => (ChangeType::Delete, true),
        "MESSAGE_CREATE" => (ChangeType::Create, false),
        "MESSAGE_UPDATE" => (ChangeType::Update, false),
        "MESSAGE_DELETE" | "MESSAGE_DELETE_BULK" => (ChangeType::Delete, false),
        _ => return None,
    };
    if is_channel {
        // DM channels have no guild and no place in a channel tree.
        field("guild_id").map(|guild_id| SyncEvent::channel(change, guild_id))
    } else {
        field("channel_id").map(|channel_id| SyncEvent::message(change, channel_id))
    }
}

/// Long-running gateway connection feeding an [`EventSink`].
pub struct Gateway {
    config: Arc<DiscordConfig>,
    sink: Arc<dyn EventSink>,
    reconnect: RetryPolicy,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(
        config: Arc<DiscordConfig>,
        sink: Arc<dyn EventSink>,
        reconnect: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            sink,
            reconnect,
            shutdown,
        }
    }

    /// Runs sessions until shutdown or a fatal close.
    pub async fn run(self) -> Result<(), GatewayError> {
        let mut failures = 0u32;
        let mut sessions = 0u64;

        loop {
            info!(url = %self.config.gateway_url, "Connecting to Discord gateway");
            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                result = connect_async(self.config.gateway_url.as_str()) => result,
            };

            match connected {
                Ok((stream, _)) => {
                    let end = self.session(stream, sessions > 0).await;
                    sessions += 1;
                    match end {
                        SessionEnd::Shutdown => return Ok(()),
                        SessionEnd::Fatal { code, reason } => {
                            error!(code, reason = %reason, "Gateway session closed permanently");
                            return Err(GatewayError::Fatal { code, reason });
                        }
                        SessionEnd::Reconnect { ready } => {
                            if ready {
                                failures = 0;
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Gateway connection failed"),
            }

            failures = failures.saturating_add(1);
            let delay = self.reconnect.delay_for_attempt(failures);
            warn!(attempt = failures, delay = ?delay, "Reconnecting to gateway");
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn session(&self, stream: WsStream, resumed: bool) -> SessionEnd {
        let (mut ws_tx, mut ws_rx) = stream.split();
        let mut heartbeat: Option<Interval> = None;
        let mut sequence: Option<u64> = None;
        let mut acked = true;
        let mut ready = false;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Gateway shutting down");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }

                _ = tick(&mut heartbeat) => {
                    if !acked {
                        warn!("Heartbeat not acknowledged, reconnecting");
                        return SessionEnd::Reconnect { ready };
                    }
                    acked = false;
                    if ws_tx.send(heartbeat_frame(sequence)).await.is_err() {
                        return SessionEnd::Reconnect { ready };
                    }
                }

                msg = ws_rx.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                                .unwrap_or((1000, String::new()));
                            if is_fatal_close(code) {
                                return SessionEnd::Fatal { code, reason };
                            }
                            info!(code, reason = %reason, "Gateway closed connection");
                            return SessionEnd::Reconnect { ready };
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!(error = %e, "Gateway WebSocket error");
                            return SessionEnd::Reconnect { ready };
                        }
                        None => {
                            info!("Gateway stream ended");
                            return SessionEnd::Reconnect { ready };
                        }
                    };

                    let payload: Payload = match serde_json::from_str(text.as_str()) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "Discarding malformed gateway payload");
                            continue;
                        }
                    };

                    match payload.op {
                        OP_HELLO => {
                            let interval = payload
                                .d
                                .get("heartbeat_interval")
                                .and_then(Value::as_u64)
                                .map(Duration::from_millis)
                                .unwrap_or(Duration::from_secs(41));
                            debug!(interval = ?interval, "Gateway hello");
                            let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
                            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            heartbeat = Some(timer);
                            if ws_tx.send(self.identify_frame()).await.is_err() {
                                return SessionEnd::Reconnect { ready };
                            }
                        }
                        OP_DISPATCH => {
                            if payload.s.is_some() {
                                sequence = payload.s;
                            }
                            let Some(event_type) = payload.t.as_deref() else {
                                continue;
                            };
                            if event_type == "READY" {
                                ready = true;
                                info!("Gateway session ready");
                                if resumed {
                                    self.sink.resync();
                                }
                            } else if let Some(event) = dispatch_event(event_type, &payload.d) {
                                trace!(event_type, scope_id = event.scope_id(), "Gateway dispatch");
                                self.sink.publish(event);
                            }
                        }
                        OP_HEARTBEAT => {
                            if ws_tx.send(heartbeat_frame(sequence)).await.is_err() {
                                return SessionEnd::Reconnect { ready };
                            }
                        }
                        OP_HEARTBEAT_ACK => acked = true,
                        OP_RECONNECT => {
                            info!("Gateway requested reconnect");
                            return SessionEnd::Reconnect { ready };
                        }
                        OP_INVALID_SESSION => {
                            warn!("Gateway invalidated the session");
                            return SessionEnd::Reconnect { ready };
                        }
                        op => trace!(op, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }

    fn identify_frame(&self) -> Message {
        let payload = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.config.token,
                "intents": self.config.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "guildhall",
                    "device": "guildhall",
                },
            },
        });
        Message::Text(payload.to_string().into())
    }
}

fn heartbeat_frame(sequence: Option<u64>) -> Message {
    Message::Text(json!({ "op": OP_HEARTBEAT, "d": sequence }).to_string().into())
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}
