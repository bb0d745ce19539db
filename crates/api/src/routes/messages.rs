//! Message routes
//!
//! Conversation history, message creation, deletion, read receipts and unread
//! counters. Every mutation is persisted first and then handed to the delivery
//! pipeline for realtime fan-out.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use supportchat_shared::{
    DeleteMode, Message, MessageId, MessageKind, NewMessage, SenderType, UnreadSummary, UserId,
};

use crate::{
    auth::AuthUser,
    delivery::BroadcastReport,
    error::{ApiError, ApiJson, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub content: String,
    #[serde(default, alias = "type")]
    pub kind: MessageKind,
    /// Target conversation; required for admins, optional for clients
    #[serde(default, alias = "clienteId")]
    pub client_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageRequest {
    pub mode: DeleteMode,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub message: String,
    pub mode: DeleteMode,
    pub id: MessageId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub success: bool,
    pub updated_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub content: String,
    #[serde(default, alias = "type")]
    pub kind: MessageKind,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: BroadcastReport,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a message in a conversation
///
/// The sender side comes from the caller's role. Admins must name the target
/// conversation; clients always write into their own.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let content = validate_content(&req.content)?;
    let sender_type = SenderType::from(auth_user.role);

    let client_id = match sender_type {
        SenderType::Admin => req
            .client_id
            .ok_or_else(|| ApiError::Validation("clientId is required for admin messages".into()))?,
        SenderType::Client => match req.client_id {
            Some(id) if id != auth_user.user_id => return Err(ApiError::Forbidden),
            _ => auth_user.user_id,
        },
    };
    ensure_positive(client_id.0, "clientId")?;

    // A client creating its own conversation supplies the name and email used
    // for the client record; admins never lend theirs
    let profile = (sender_type == SenderType::Client).then(|| auth_user.profile());

    let (message, client) = state
        .store
        .create_message(
            NewMessage {
                content,
                kind: req.kind,
                sender_type,
                author_user_id: auth_user.user_id,
                client_id,
            },
            profile.as_ref(),
        )
        .await?;

    tracing::info!(
        message_id = %message.id,
        client_id = %client_id,
        author = %auth_user.user_id,
        "Message created"
    );

    state.delivery.message_created(&message, &client).await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// The caller's own conversation history
pub async fn list_my_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .store
        .list_conversation(auth_user.user_id, auth_user.user_id)
        .await?;
    Ok(Json(messages))
}

/// History of one conversation (admins: any, clients: their own)
pub async fn list_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(client_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let client_id = UserId(parse_id(&client_id, "client id")?);
    if !auth_user.is_admin() && client_id != auth_user.user_id {
        return Err(ApiError::Forbidden);
    }

    let messages = state
        .store
        .list_conversation(client_id, auth_user.user_id)
        .await?;
    Ok(Json(messages))
}

/// Delete a message for everyone (`ALL`, author only) or hide it for the
/// caller (`SELF`)
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<DeleteMessageRequest>,
) -> ApiResult<Json<DeleteMessageResponse>> {
    let id = MessageId(parse_id(&id, "message id")?);

    let message = state
        .store
        .delete_message(id, &auth_user.requester(), req.mode)
        .await?;

    let text = match req.mode {
        DeleteMode::All => {
            state.delivery.message_deleted(&message).await;
            tracing::info!(message_id = %id, user_id = %auth_user.user_id, "Message deleted for everyone");
            "Message deleted for everyone"
        }
        DeleteMode::SelfOnly => {
            tracing::debug!(message_id = %id, user_id = %auth_user.user_id, "Message hidden for user");
            "Message removed from your view"
        }
    };

    Ok(Json(DeleteMessageResponse {
        message: text.to_string(),
        mode: req.mode,
        id,
    }))
}

/// Mark messages read and notify their authors
///
/// Only messages the caller takes part in and did not write are changed.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(req): ApiJson<MarkReadRequest>,
) -> ApiResult<Json<MarkReadResponse>> {
    if req.message_ids.is_empty() {
        return Err(ApiError::Validation("messageIds must not be empty".into()));
    }
    for id in &req.message_ids {
        ensure_positive(id.0, "message id")?;
    }

    let updates = state
        .store
        .mark_read(&req.message_ids, &auth_user.requester())
        .await?;

    state
        .delivery
        .messages_read(&updates, auth_user.user_id)
        .await;

    Ok(Json(MarkReadResponse {
        success: true,
        updated_count: updates.len(),
    }))
}

/// Unread counters for the caller
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UnreadSummary>> {
    let summary = state
        .store
        .count_unread(auth_user.user_id, auth_user.role)
        .await?;
    Ok(Json(summary))
}

/// Send the same admin message to every client (admin only)
pub async fn broadcast(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(req): ApiJson<BroadcastRequest>,
) -> ApiResult<(StatusCode, Json<BroadcastResponse>)> {
    auth_user.require_admin()?;
    let content = validate_content(&req.content)?;

    let report = state
        .delivery
        .broadcast_to_all_clients(auth_user.user_id, &content, req.kind)
        .await?;

    if report.count == 0 {
        return Err(ApiError::NotFound);
    }

    Ok((
        StatusCode::CREATED,
        Json(BroadcastResponse {
            message: "Messages sent".to_string(),
            report,
        }),
    ))
}

// =============================================================================
// Validation helpers
// =============================================================================

fn validate_content(content: &str) -> ApiResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("content must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn parse_id(raw: &str, what: &str) -> ApiResult<i64> {
    let id = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::Validation(format!("invalid {}", what)))?;
    ensure_positive(id, what)?;
    Ok(id)
}

fn ensure_positive(id: i64, what: &str) -> ApiResult<()> {
    if id <= 0 {
        return Err(ApiError::Validation(format!("invalid {}", what)));
    }
    Ok(())
}
