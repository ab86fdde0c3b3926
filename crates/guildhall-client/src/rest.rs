//! HTTP client for the dashboard REST surface.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use guildhall_core::api::codes;
use guildhall_core::{
    BotProfile, ChannelId, ChatMessage, ErrorBody, GENERIC_ERROR_MESSAGE, GuildId,
    GuildPresence, GuildSnapshot, GuildSummary, InviteLink, MessageId, MessagePayload,
    ProfileRequest,
};

use crate::error::{ClientError, ClientResult};

/// Default bound on one dashboard request.
///
/// Longer than the server's own upstream timeout so retried upstream calls
/// can still answer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed client for one dashboard server.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: Client,
    base_url: String,
}

impl DashboardClient {
    /// Creates a client for `base_url` (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client whose requests fail after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let http = ClientBuilder::new().timeout(timeout).build()?;
        Self::with_http(http, base_url)
    }

    /// Creates a client reusing an existing `reqwest` client.
    pub fn with_http(http: Client, base_url: impl Into<String>) -> ClientResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl {
                url: base_url,
                reason: "expected an http:// or https:// URL".into(),
            });
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket URL of the push channel mounted at `push_path`.
    pub fn push_url(&self, push_path: &str) -> String {
        let ws_base = match self.base_url.strip_prefix("https://") {
            Some(rest) => format!("wss://{rest}"),
            None => format!(
                "ws://{}",
                self.base_url.trim_start_matches("http://")
            ),
        };
        format!("{ws_base}{push_path}")
    }

    pub async fn bot_profile(&self) -> ClientResult<BotProfile> {
        self.json(self.request(Method::GET, "/bot")).await
    }

    /// Changes the bot's username and/or avatar (base64 or data URI).
    pub async fn update_profile(&self, request: &ProfileRequest) -> ClientResult<BotProfile> {
        self.json(self.request(Method::PATCH, "/bot/profile").json(request))
            .await
    }

    pub async fn guilds(&self) -> ClientResult<Vec<GuildSummary>> {
        self.json(self.request(Method::GET, "/guilds")).await
    }

    /// Probes whether the bot is a member of `guild_id`.
    pub async fn presence(&self, guild_id: &GuildId) -> ClientResult<GuildPresence> {
        self.json(self.request(Method::GET, &format!("/guilds/{guild_id}")))
            .await
    }

    pub async fn channel_tree(&self, guild_id: &GuildId) -> ClientResult<GuildSnapshot> {
        self.json(self.request(Method::GET, &format!("/guilds/{guild_id}/channels")))
            .await
    }

    pub async fn invite(&self, guild_id: &GuildId) -> ClientResult<InviteLink> {
        self.json(self.request(Method::GET, &format!("/guilds/{guild_id}/invite")))
            .await
    }

    pub async fn messages(&self, channel_id: &ChannelId) -> ClientResult<Vec<ChatMessage>> {
        self.json(self.request(Method::GET, &format!("/channels/{channel_id}/messages")))
            .await
    }

    pub async fn send_message(
        &self,
        channel_id: &ChannelId,
        content: impl Into<String>,
    ) -> ClientResult<ChatMessage> {
        let path = format!("/channels/{channel_id}/messages");
        self.json(self.request(Method::POST, &path).json(&payload(content)))
            .await
    }

    pub async fn edit_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        content: impl Into<String>,
    ) -> ClientResult<ChatMessage> {
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        self.json(self.request(Method::PATCH, &path).json(&payload(content)))
            .await
    }

    pub async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> ClientResult<()> {
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(method = %method, path = %path, "Calling dashboard");
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let bytes = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status = status.as_u16();
        let bytes = response.bytes().await.unwrap_or_default();
        let body = parse_error_body(status, &bytes);
        warn!(status, code = %body.code, "Dashboard request failed");
        Err(ClientError::Api { status, body })
    }
}

fn payload(content: impl Into<String>) -> MessagePayload {
    MessagePayload {
        content: content.into(),
    }
}

/// Parses a structured error body, falling back to the generic message with
/// the raw text as detail.
fn parse_error_body(status: u16, bytes: &[u8]) -> ErrorBody {
    if let Ok(body) = serde_json::from_slice::<ErrorBody>(bytes) {
        return body;
    }
    let code = match status {
        403 => codes::FORBIDDEN,
        404 => codes::NOT_FOUND,
        _ => codes::INTERNAL,
    };
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    let body = ErrorBody::new(code, GENERIC_ERROR_MESSAGE);
    if text.is_empty() {
        body.with_detail(format!("HTTP {status}"))
    } else {
        body.with_detail(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> DashboardClient {
        DashboardClient::new(server.uri()).unwrap()
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            DashboardClient::new("ws://localhost"),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn push_url_swaps_scheme() {
        let plain = DashboardClient::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(plain.push_url("/push"), "ws://127.0.0.1:8080/push");
        let tls = DashboardClient::new("https://dash.example").unwrap();
        assert_eq!(tls.push_url("/push"), "wss://dash.example/push");
    }

    #[tokio::test]
    async fn fetches_channel_tree() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/g1/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "g1",
                "name": "Guild",
                "channels": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client(&server)
            .await
            .channel_tree(&"g1".into())
            .await
            .unwrap();
        assert_eq!(snapshot.id, GuildId::from("g1"));
        assert!(snapshot.channels.is_empty());
    }

    #[tokio::test]
    async fn sends_message_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .and(body_json(json!({"content": "hello"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "m1",
                "channelId": "c1",
                "author": "bot",
                "content": "hello",
                "timestamp": "2024-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let message = client(&server)
            .await
            .send_message(&"c1".into(), "hello")
            .await
            .unwrap();
        assert_eq!(message.id, MessageId::from("m1"));
        assert_eq!(message.edited_timestamp, None);
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/channels/c1/messages/m1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        tokio_test::assert_ok!(
            client(&server)
                .await
                .delete_message(&"c1".into(), &"m1".into())
                .await
        );
    }

    #[tokio::test]
    async fn structured_error_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/bot/profile"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "code": "rate_limited",
                "message": "You are changing your username too fast.",
                "retryAfterMs": 1800000
            })))
            .mount(&server)
            .await;

        let request = ProfileRequest {
            username: Some("new-name".into()),
            avatar: None,
        };
        let err = client(&server)
            .await
            .update_profile(&request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(codes::RATE_LIMITED));
        assert_eq!(
            err.retry_after(),
            Some(std::time::Duration::from_secs(1800))
        );
    }

    #[tokio::test]
    async fn unstructured_error_gets_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server).await.guilds().await.unwrap_err();
        match err {
            ClientError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.message, GENERIC_ERROR_MESSAGE);
                assert_eq!(body.detail.as_deref(), Some("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stalled_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/g1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"present": false}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client =
            DashboardClient::with_timeout(server.uri(), Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let err = client.presence(&"g1".into()).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            ClientError::Http(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
