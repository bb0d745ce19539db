//! Web Push subscription routes

use axum::{
    extract::{Extension, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use supportchat_shared::{NewPushSubscription, PushKeys, UserId};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiJson, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeyResponse {
    pub public_key: Option<String>,
}

/// Browser `PushSubscription.toJSON()` shape
#[derive(Debug, Deserialize)]
pub struct BrowserSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub subscription: BrowserSubscription,
    #[serde(default, alias = "clienteId")]
    pub client_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub message: String,
    pub created: bool,
}

/// Public VAPID key used by browsers to subscribe
pub async fn vapid_key(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(VapidKeyResponse {
            public_key: state.config.vapid_public_key.clone(),
        }),
    )
}

/// Register a browser endpoint for a client's notifications
///
/// Clients may only subscribe for themselves. Registering a known endpoint is
/// accepted and changes nothing.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(req): ApiJson<SubscribeRequest>,
) -> ApiResult<(StatusCode, Json<SubscribeResponse>)> {
    let client_id = match (auth_user.is_admin(), req.client_id) {
        (true, Some(id)) => id,
        (true, None) => {
            return Err(ApiError::Validation("clientId is required".into()));
        }
        (false, Some(id)) if id != auth_user.user_id => return Err(ApiError::Forbidden),
        (false, _) => auth_user.user_id,
    };

    let endpoint = req.subscription.endpoint.trim();
    if !endpoint.starts_with("https://") {
        return Err(ApiError::Validation("endpoint must be an https URL".into()));
    }
    if req.subscription.keys.p256dh.is_empty() || req.subscription.keys.auth.is_empty() {
        return Err(ApiError::Validation("subscription keys are required".into()));
    }

    // Subscribing before the first message must not fail on a missing client row
    let profile = (!auth_user.is_admin()).then(|| auth_user.profile());
    state
        .store
        .ensure_client(client_id, auth_user.user_id, profile.as_ref())
        .await?;

    let created = state
        .store
        .add_push_subscription(NewPushSubscription {
            endpoint: endpoint.to_string(),
            keys: req.subscription.keys,
            client_id,
        })
        .await?;

    tracing::info!(client_id = %client_id, created, "Push subscription registered");

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(SubscribeResponse {
            message: "Subscribed".to_string(),
            created,
        }),
    ))
}
