//! REST routes of the dashboard.
//!
//! ```text
//! GET    /bot                                  → bot profile
//! PATCH  /bot/profile                          → username / avatar change
//! GET    /guilds                               → guild list
//! GET    /guilds/{guild_id}                    → presence probe
//! GET    /guilds/{guild_id}/channels           → channel tree (cached)
//! GET    /guilds/{guild_id}/invite             → invite link
//! GET    /channels/{channel_id}/messages       → recent messages (cached)
//! POST   /channels/{channel_id}/messages       → send
//! PATCH  /channels/{channel_id}/messages/{id}  → edit
//! DELETE /channels/{channel_id}/messages/{id}  → delete
//! GET    {push_path}                           → push WebSocket
//! ```

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};

use guildhall_core::{
    BotProfile, ChannelId, ChatMessage, GuildId, GuildPresence, GuildSnapshot, GuildSummary,
    InviteLink, MessageId, MessagePayload, ProfileRequest,
};

use crate::error::ApiResult;
use crate::push::push_handler;
use crate::service::DashboardService;

type AppState = State<Arc<DashboardService>>;

/// Builds the dashboard router with the push channel mounted at `push_path`.
pub fn router(service: Arc<DashboardService>, push_path: &str) -> Router {
    Router::new()
        .route("/bot", get(bot_profile))
        .route("/bot/profile", patch(update_profile))
        .route("/guilds", get(list_guilds))
        .route("/guilds/{guild_id}", get(presence))
        .route("/guilds/{guild_id}/channels", get(channel_tree))
        .route("/guilds/{guild_id}/invite", get(invite))
        .route(
            "/channels/{channel_id}/messages",
            get(messages).post(send_message),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}",
            patch(edit_message).delete(delete_message),
        )
        .route(push_path, get(push_handler))
        .with_state(service)
}

async fn bot_profile(State(service): AppState) -> ApiResult<Json<BotProfile>> {
    Ok(Json(service.bot_profile().await?))
}

async fn update_profile(
    State(service): AppState,
    body: Result<Json<ProfileRequest>, JsonRejection>,
) -> ApiResult<Json<BotProfile>> {
    let Json(request) = body?;
    Ok(Json(service.update_profile(request).await?))
}

async fn list_guilds(State(service): AppState) -> ApiResult<Json<Vec<GuildSummary>>> {
    Ok(Json(service.list_guilds().await?))
}

async fn presence(
    State(service): AppState,
    Path(guild_id): Path<GuildId>,
) -> ApiResult<Json<GuildPresence>> {
    Ok(Json(service.presence(&guild_id).await?))
}

async fn channel_tree(
    State(service): AppState,
    Path(guild_id): Path<GuildId>,
) -> ApiResult<Json<GuildSnapshot>> {
    Ok(Json(service.channel_tree(&guild_id).await?))
}

async fn invite(
    State(service): AppState,
    Path(guild_id): Path<GuildId>,
) -> ApiResult<Json<InviteLink>> {
    Ok(Json(service.invite(&guild_id).await?))
}

async fn messages(
    State(service): AppState,
    Path(channel_id): Path<ChannelId>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(service.messages(&channel_id).await?))
}

async fn send_message(
    State(service): AppState,
    Path(channel_id): Path<ChannelId>,
    body: Result<Json<MessagePayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let Json(payload) = body?;
    let message = service.send_message(&channel_id, payload).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn edit_message(
    State(service): AppState,
    Path((channel_id, message_id)): Path<(ChannelId, MessageId)>,
    body: Result<Json<MessagePayload>, JsonRejection>,
) -> ApiResult<Json<ChatMessage>> {
    let Json(payload) = body?;
    Ok(Json(
        service
            .edit_message(&channel_id, &message_id, payload)
            .await?,
    ))
}

async fn delete_message(
    State(service): AppState,
    Path((channel_id, message_id)): Path<(ChannelId, MessageId)>,
) -> ApiResult<StatusCode> {
    service.delete_message(&channel_id, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
