//! Durable conversation routes.
//!
//! The REST path is the source of truth. Writes that land here are
//! also pushed to the conversation room so live clients see them
//! without refetching.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use ideabridge_chats::{Conversation, ConversationWithMessages, Message};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;
use crate::util::require_bearer;
use crate::websocket::ServerEvent;
use crate::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub counterpart_id: String,
    pub idea_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

pub async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let (conversation, created) = state
        .store()
        .create(&user, &request.counterpart_id, &request.idea_id)
        .await?;

    let status = if created {
        info!(
            conversation = %conversation.public_id,
            initiator = %user.public_id,
            "opened conversation"
        );
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conversation)))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let conversations = state.store().list_for_participant(user.id).await?;
    Ok(Json(ConversationsResponse { conversations }))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationWithMessages>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let conversation = state.store().fetch(&conversation_id, user.id).await?;
    Ok(Json(conversation))
}

pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let message = state
        .store()
        .append_message(&conversation_id, user.id, &request.content)
        .await?;

    let event = ServerEvent::NewMessage {
        conversation_id: conversation_id.clone(),
        timestamp: message.created_at.clone(),
        message: message.clone(),
    };
    state.rooms().broadcast(&conversation_id, event).await;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let updated = state.store().mark_read(&conversation_id, user.id).await?;
    Ok(Json(MarkReadResponse { updated }))
}
