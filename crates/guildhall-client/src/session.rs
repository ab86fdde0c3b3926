//! Session-owned background work of a dashboard client.
//!
//! A [`DashboardSession`] owns everything that keeps running while a
//! dashboard page is open:
//!
//! | Task | Purpose |
//! |------|---------|
//! | push listener | keeps the push channel open and announces the selection |
//! | dispatcher | turns relevant push events into re-fetches |
//! | refresh | re-fetches the selected channel's messages periodically |
//! | presence monitors | one per [`DashboardSession::watch_presence`] call |
//!
//! All tasks hang off one cancellation token. [`DashboardSession::close`]
//! (or dropping the session) cancels it, so nothing keeps firing against an
//! abandoned session.
//!
//! Re-fetches go through the normal REST path; push payloads are never
//! trusted as data. Results arrive as [`SessionUpdate`]s.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use guildhall_core::{
    ChannelId, ChatMessage, ClientView, GuildId, GuildSnapshot, Refetch, RetryPolicy,
    SubscriptionFilter, SyncEvent,
};

use crate::error::ClientError;
use crate::presence::PresenceMonitor;
use crate::push::PushListener;
use crate::rest::DashboardClient;

/// Default push path of the dashboard server.
pub const DEFAULT_PUSH_PATH: &str = "/push";
/// Default period of the message refresh.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Settings of a [`DashboardSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Push path on the dashboard server.
    pub push_path: String,
    /// Full push URL; derived from the client's base URL when `None`.
    pub push_url: Option<String>,
    pub refresh_interval: Duration,
    /// Delays between push reconnects.
    pub reconnect: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            push_path: DEFAULT_PUSH_PATH.to_string(),
            push_url: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            reconnect: RetryPolicy::default(),
        }
    }
}

/// Fresh data pulled after an invalidation or a refresh tick.
#[derive(Debug)]
pub enum SessionUpdate {
    ChannelTree(GuildSnapshot),
    Messages {
        channel_id: ChannelId,
        messages: Vec<ChatMessage>,
    },
    /// A re-fetch failed; the dashboard shows `error.user_message()`.
    FetchFailed {
        refetch: Refetch,
        error: ClientError,
    },
}

struct Shared {
    client: DashboardClient,
    view: Mutex<ClientView>,
    selection: watch::Sender<SubscriptionFilter>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl Shared {
    fn is_current(&self, refetch: &Refetch) -> bool {
        let view = self.view.lock();
        match refetch {
            Refetch::ChannelTree(guild_id) => view.selection().guild_id.as_ref() == Some(guild_id),
            Refetch::Messages(channel_id) => {
                view.selection().channel_id.as_ref() == Some(channel_id)
            }
        }
    }

    /// Pulls the slice and emits it, unless the selection moved on meanwhile.
    async fn refetch(&self, refetch: Refetch) {
        let update = match &refetch {
            Refetch::ChannelTree(guild_id) => self
                .client
                .channel_tree(guild_id)
                .await
                .map(SessionUpdate::ChannelTree),
            Refetch::Messages(channel_id) => {
                self.client
                    .messages(channel_id)
                    .await
                    .map(|messages| SessionUpdate::Messages {
                        channel_id: channel_id.clone(),
                        messages,
                    })
            }
        };

        if !self.is_current(&refetch) {
            debug!(?refetch, "Dropping re-fetch for a stale selection");
            return;
        }
        let update = update.unwrap_or_else(|error| {
            warn!(?refetch, error = %error, "Re-fetch failed");
            SessionUpdate::FetchFailed { refetch, error }
        });
        let _ = self.updates.send(update);
    }
}

/// A live dashboard client session.
pub struct DashboardSession {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DashboardSession {
    /// Opens a session and starts its background tasks.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn open(
        client: DashboardClient,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (selection_tx, selection_rx) = watch::channel(SubscriptionFilter::default());
        let push_url = config
            .push_url
            .clone()
            .unwrap_or_else(|| client.push_url(&config.push_path));

        let shared = Arc::new(Shared {
            client,
            view: Mutex::new(ClientView::new()),
            selection: selection_tx,
            updates: updates_tx,
        });
        let shutdown = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let listener = PushListener::new(push_url.clone(), shutdown.child_token())
            .with_reconnect(config.reconnect);

        let tasks = vec![
            tokio::spawn(listener.run(selection_rx, events_tx)),
            tokio::spawn(dispatch(shared.clone(), events_rx, shutdown.child_token())),
            tokio::spawn(refresh(
                shared.clone(),
                config.refresh_interval,
                shutdown.child_token(),
            )),
        ];
        info!(push_url = %push_url, "Dashboard session opened");

        let session = Self {
            shared,
            shutdown,
            tasks: Mutex::new(tasks),
        };
        (session, updates_rx)
    }

    pub fn client(&self) -> &DashboardClient {
        &self.shared.client
    }

    pub fn selection(&self) -> SubscriptionFilter {
        self.shared.view.lock().selection().clone()
    }

    /// Selects a guild and pulls its channel tree.
    pub fn select_guild(&self, guild_id: Option<GuildId>) {
        let selection = {
            let mut view = self.shared.view.lock();
            view.select_guild(guild_id.clone());
            view.selection().clone()
        };
        self.shared.selection.send_replace(selection);
        if let Some(guild_id) = guild_id {
            self.spawn_refetch(Refetch::ChannelTree(guild_id));
        }
    }

    /// Selects a channel and pulls its messages.
    pub fn select_channel(&self, channel_id: Option<ChannelId>) {
        let selection = {
            let mut view = self.shared.view.lock();
            view.select_channel(channel_id.clone());
            view.selection().clone()
        };
        self.shared.selection.send_replace(selection);
        if let Some(channel_id) = channel_id {
            self.spawn_refetch(Refetch::Messages(channel_id));
        }
    }

    fn spawn_refetch(&self, refetch: Refetch) {
        let shared = self.shared.clone();
        let token = self.shutdown.child_token();
        self.track(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = shared.refetch(refetch) => {}
            }
        }));
    }

    /// Starts a presence monitor owned by this session.
    ///
    /// The monitor stops when the session closes.
    pub fn watch_presence(&self, monitor: PresenceMonitor) -> Arc<PresenceMonitor> {
        let monitor = Arc::new(monitor);
        let handle = monitor.clone().spawn(self.shutdown.child_token());
        let guild_id = monitor.guild_id().clone();
        self.track(tokio::spawn(async move {
            match handle.await {
                Ok(state) => debug!(guild_id = %guild_id, state = %state, "Presence monitor finished"),
                Err(e) => warn!(guild_id = %guild_id, error = %e, "Presence monitor failed"),
            }
        }));
        monitor
    }

    /// Builds a monitor for `guild_id` using this session's client.
    pub fn presence_monitor(&self, guild_id: GuildId) -> PresenceMonitor {
        PresenceMonitor::new(Arc::new(self.shared.client.clone()), guild_id)
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops all background tasks and waits for them.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Session task ended abnormally");
            }
        }
        info!("Dashboard session closed");
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<SyncEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let refetch = shared.view.lock().refetch_for(&event);
        match refetch {
            Some(refetch) => {
                debug!(event = event.event_name(), scope = event.scope_id(), "Relevant push event");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = shared.refetch(refetch) => {}
                }
            }
            None => debug!(event = event.event_name(), scope = event.scope_id(), "Ignoring push event"),
        }
    }
}

async fn refresh(shared: Arc<Shared>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let channel_id = shared.view.lock().selection().channel_id.clone();
                if let Some(channel_id) = channel_id {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = shared.refetch(Refetch::Messages(channel_id)) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::{SinkExt, StreamExt};
    use guildhall_core::ChangeType;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::presence::PresenceState;

    const WAIT: Duration = Duration::from_secs(5);

    fn config(push_url: String, refresh: Duration) -> SessionConfig {
        SessionConfig {
            push_url: Some(push_url),
            refresh_interval: refresh,
            reconnect: RetryPolicy::from_millis(1, 20, 20).unwrap(),
            ..Default::default()
        }
    }

    /// A push URL nobody listens on.
    fn dead_push_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("ws://{}", listener.local_addr().unwrap())
    }

    async fn mount_messages(server: &MockServer, channel: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/channels/{channel}/messages")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "m1",
                "channelId": channel,
                "author": "someone",
                "content": "hi",
                "timestamp": "2024-01-01T00:00:00Z"
            }])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn selecting_a_channel_pulls_and_refreshes_messages() {
        let server = MockServer::start().await;
        mount_messages(&server, "c1").await;
        Mock::given(method("GET"))
            .and(path("/guilds/g1/channels"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "g1", "name": "G", "channels": []})),
            )
            .mount(&server)
            .await;

        let client = DashboardClient::new(server.uri()).unwrap();
        let (session, mut updates) =
            DashboardSession::open(client, config(dead_push_url(), Duration::from_millis(100)));

        session.select_guild(Some("g1".into()));
        session.select_channel(Some("c1".into()));

        let mut messages = 0;
        let mut trees = 0;
        while messages < 2 || trees < 1 {
            match tokio::time::timeout(WAIT, updates.recv()).await.unwrap().unwrap() {
                SessionUpdate::ChannelTree(snapshot) => {
                    assert_eq!(snapshot.id, GuildId::from("g1"));
                    trees += 1;
                }
                SessionUpdate::Messages { channel_id, messages: list } => {
                    assert_eq!(channel_id, ChannelId::from("c1"));
                    assert_eq!(list.len(), 1);
                    messages += 1;
                }
                other => panic!("unexpected update: {other:?}"),
            }
        }
        assert_eq!(trees, 1);

        session.close().await;
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn push_event_for_selected_guild_pulls_tree() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/g1/channels"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "g1", "name": "G", "channels": []})),
            )
            .mount(&server)
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let push_url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            // Wait for the selection naming g1, then announce changes.
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame
                    && text.as_str().contains("\"g1\"")
                {
                    for event in [
                        SyncEvent::channel(ChangeType::Create, "g2"),
                        SyncEvent::channel(ChangeType::Create, "g1"),
                    ] {
                        let text = serde_json::to_string(&event).unwrap();
                        ws.send(Message::Text(text.into())).await.unwrap();
                    }
                }
            }
        });

        let client = DashboardClient::new(server.uri()).unwrap();
        let (session, mut updates) =
            DashboardSession::open(client, config(push_url, Duration::from_secs(60)));
        session.select_guild(Some("g1".into()));

        // One pull from selecting the guild, one from the g1 event.
        for _ in 0..2 {
            let update = tokio::time::timeout(WAIT, updates.recv()).await.unwrap().unwrap();
            assert!(matches!(update, SessionUpdate::ChannelTree(ref s) if s.id == GuildId::from("g1")));
        }
        session.close().await;
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(504).set_body_json(json!({
                "code": "timeout",
                "message": "upstream call timed out"
            })))
            .mount(&server)
            .await;

        let client = DashboardClient::new(server.uri()).unwrap();
        let (session, mut updates) =
            DashboardSession::open(client, config(dead_push_url(), Duration::from_secs(60)));
        session.select_channel(Some("c1".into()));

        match tokio::time::timeout(WAIT, updates.recv()).await.unwrap().unwrap() {
            SessionUpdate::FetchFailed { refetch, error } => {
                assert_eq!(refetch, Refetch::Messages("c1".into()));
                assert_eq!(error.user_message(), "upstream call timed out");
            }
            other => panic!("unexpected update: {other:?}"),
        }
        session.close().await;
    }

    #[tokio::test]
    async fn close_stops_presence_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/g1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"present": false})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/guilds/g1/invite"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": "https://invite.example"})),
            )
            .mount(&server)
            .await;

        let client = DashboardClient::new(server.uri()).unwrap();
        let (session, _updates) =
            DashboardSession::open(client, config(dead_push_url(), Duration::from_secs(60)));
        let monitor = session.watch_presence(
            session
                .presence_monitor("g1".into())
                .with_poll_interval(Duration::from_millis(20)),
        );

        let mut states = monitor.subscribe();
        tokio::time::timeout(WAIT, states.wait_for(|s| *s == PresenceState::Inviting))
            .await
            .unwrap()
            .unwrap();

        session.close().await;
        let probes = server.received_requests().await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), probes);
    }
}
