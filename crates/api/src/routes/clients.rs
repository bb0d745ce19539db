//! Client directory routes (admin only)

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use supportchat_shared::{Client, UserId};

use super::messages::parse_id;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// All clients ordered by name
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Client>>> {
    auth_user.require_admin()?;
    Ok(Json(state.store.list_clients().await?))
}

/// Remove a client together with its messages and push subscriptions
pub async fn delete_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    auth_user.require_admin()?;
    let id = UserId(parse_id(&id, "client id")?);

    if state.store.get_client(id).await?.is_none() {
        return Err(ApiError::NotFound);
    }
    state.store.delete_client(id).await?;

    tracing::info!(client_id = %id, admin_id = %auth_user.user_id, "Client deleted");
    Ok(StatusCode::NO_CONTENT)
}
