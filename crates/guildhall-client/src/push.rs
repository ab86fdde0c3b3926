//! Push channel consumer with reconnection.
//!
//! The listener keeps one WebSocket open to the dashboard's push path. After
//! every (re)connect it announces the current selection, and it re-announces
//! whenever the selection changes. Received frames are decoded into
//! [`SyncEvent`]s and forwarded on a channel.
//!
//! ```text
//!  selection (watch) ──▶ {"type":"select",..} ──▶ server
//!  server ──▶ {"event":"messageUpdate",..} ──▶ SyncEvent ──▶ events (mpsc)
//! ```

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use guildhall_core::{ClientFrame, RetryPolicy, SubscriptionFilter, SyncEvent};

use crate::error::ClientResult;

/// How a push session ended.
enum SessionEnd {
    /// Shutdown requested or nobody is listening anymore.
    Stop,
    /// The connection dropped after having been established.
    Dropped,
}

/// Consumes the dashboard push channel.
pub struct PushListener {
    url: String,
    reconnect: RetryPolicy,
    shutdown: CancellationToken,
}

impl PushListener {
    pub fn new(url: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            url: url.into(),
            reconnect: RetryPolicy::default(),
            shutdown,
        }
    }

    /// Sets the delays used between reconnect attempts.
    ///
    /// Only the delay schedule is used; reconnection continues until
    /// shutdown.
    pub fn with_reconnect(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Runs until the shutdown token is cancelled or `events` is closed.
    pub async fn run(
        self,
        mut selection: watch::Receiver<SubscriptionFilter>,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) {
        let mut failures = 0u32;
        loop {
            match self.session(&mut selection, &events).await {
                Ok(SessionEnd::Stop) => break,
                Ok(SessionEnd::Dropped) => {
                    failures = 0;
                    info!(url = %self.url, "Push channel dropped, reconnecting");
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, attempt = failures + 1, "Push channel connection failed");
                }
            }

            failures = failures.saturating_add(1);
            let delay = self.reconnect.delay_for_attempt(failures);
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnecting push channel");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(url = %self.url, "Push listener stopped");
    }

    async fn session(
        &self,
        selection: &mut watch::Receiver<SubscriptionFilter>,
        events: &mpsc::UnboundedSender<SyncEvent>,
    ) -> ClientResult<SessionEnd> {
        let connected = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Stop),
            result = connect_async(self.url.as_str()) => result?,
        };
        let (mut tx, mut rx) = connected.0.split();
        info!(url = %self.url, "Push channel connected");

        let current = selection.borrow_and_update().clone();
        tx.send(select_frame(current)?).await?;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = tx.close().await;
                    return Ok(SessionEnd::Stop);
                }
                _ = events.closed() => {
                    let _ = tx.close().await;
                    return Ok(SessionEnd::Stop);
                }
                changed = selection.changed() => {
                    if changed.is_err() {
                        let _ = tx.close().await;
                        return Ok(SessionEnd::Stop);
                    }
                    let current = selection.borrow_and_update().clone();
                    trace!(?current, "Selection changed");
                    tx.send(select_frame(current)?).await?;
                }
                frame = rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SyncEvent>(text.as_str()) {
                            Ok(event) => {
                                trace!(event = event.event_name(), scope = event.scope_id(), "Push event");
                                if events.send(event).is_err() {
                                    return Ok(SessionEnd::Stop);
                                }
                            }
                            Err(e) => warn!(error = %e, "Ignoring undecodable push frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Dropped),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Push channel error");
                        return Ok(SessionEnd::Dropped);
                    }
                }
            }
        }
    }
}

fn select_frame(filter: SubscriptionFilter) -> ClientResult<Message> {
    let frame = ClientFrame::Select {
        guild_id: filter.guild_id,
        channel_id: filter.channel_id,
    };
    Ok(Message::Text(serde_json::to_string(&frame)?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use guildhall_core::ChangeType;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn fast_reconnect() -> RetryPolicy {
        RetryPolicy::from_millis(1, 10, 10).unwrap()
    }

    async fn next_json<S>(rx: &mut S) -> Value
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match rx.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn announces_selection_and_forwards_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut tx, mut rx) = ws.split();

            let first = next_json(&mut rx).await;
            assert_eq!(first, json!({"type": "select", "guildId": "g1", "channelId": null}));

            let event = serde_json::to_string(&SyncEvent::message(ChangeType::Create, "c1")).unwrap();
            tx.send(Message::Text(event.into())).await.unwrap();

            let second = next_json(&mut rx).await;
            assert_eq!(second, json!({"type": "select", "guildId": "g1", "channelId": "c1"}));
        });

        let token = CancellationToken::new();
        let (select_tx, select_rx) = watch::channel(SubscriptionFilter {
            guild_id: Some("g1".into()),
            channel_id: None,
        });
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(
            PushListener::new(url, token.clone())
                .with_reconnect(fast_reconnect())
                .run(select_rx, events_tx),
        );

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SyncEvent::message(ChangeType::Create, "c1"));

        select_tx.send_modify(|f| f.channel_id = Some("c1".into()));
        server.await.unwrap();

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            // First connection is closed right after the select frame.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = next_json(&mut ws).await;
            ws.close(None).await.unwrap();

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = next_json(&mut ws).await;
            let event = serde_json::to_string(&SyncEvent::channel(ChangeType::Delete, "g1")).unwrap();
            ws.send(Message::Text(event.into())).await.unwrap();
            // Keep the socket open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let token = CancellationToken::new();
        let (_select_tx, select_rx) = watch::channel(SubscriptionFilter::default());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(
            PushListener::new(url, token.clone())
                .with_reconnect(fast_reconnect())
                .run(select_rx, events_tx),
        );

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SyncEvent::channel(ChangeType::Delete, "g1"));

        token.cancel();
        task.await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_events_receiver_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (_select_tx, select_rx) = watch::channel(SubscriptionFilter::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);
        let run = PushListener::new(url, CancellationToken::new())
            .with_reconnect(fast_reconnect())
            .run(select_rx, events_tx);
        tokio::time::timeout(Duration::from_secs(5), run).await.unwrap();
    }
}
