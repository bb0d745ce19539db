//! Authentication middleware
//!
//! Every protected route expects `Authorization: Bearer <jwt>`. The verified
//! identity is stored in the request extensions as [`AuthUser`].

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use supportchat_shared::{AuthorProfile, Requester, Role, UserId};

use super::jwt::{Claims, JwtError, JwtManager};
use crate::error::ApiError;

/// Shared state for the auth layer
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: Arc<JwtManager>,
}

impl AuthState {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            jwt_manager: Arc::new(JwtManager::new(jwt_secret)),
        }
    }

    /// Verify a raw token (HTTP header or websocket query string)
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, ApiError> {
        self.jwt_manager
            .validate_token(token)
            .map(AuthUser::from)
            .map_err(|e| {
                match e {
                    JwtError::Expired => tracing::debug!("Rejected expired token"),
                    other => tracing::debug!(error = %other, "Rejected token"),
                }
                ApiError::InvalidToken
            })
    }
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn requester(&self) -> Requester {
        Requester::new(self.user_id, self.role)
    }

    pub fn profile(&self) -> AuthorProfile {
        AuthorProfile {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Fail with `Forbidden` unless the caller is an admin
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id(),
            role: claims.role(),
            name: claims.name,
            email: claims.email,
        }
    }
}

/// Middleware that requires a valid bearer token
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let auth_user = auth_state.authenticate(token)?;
    tracing::trace!(user_id = %auth_user.user_id, role = ?auth_user.role, "Request authenticated");

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}
