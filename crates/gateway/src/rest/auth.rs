//! Account and session routes.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use ideabridge_auth::{User, UserRole};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;
use crate::util::require_bearer;
use crate::ApiError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.public_id,
            email: user.email,
            display_name: user.display_name,
            role: user.role.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserResponse,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let role = UserRole::parse(&request.role)?;
    if role == UserRole::Admin {
        return Err(ApiError::bad_request("role must be innovator or investor"));
    }

    let user = state
        .authenticator()
        .register(
            &request.email,
            &request.password,
            role,
            request.display_name.as_deref(),
        )
        .await?;

    info!(user = %user.public_id, role = %request.role, "registered account");
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .authenticator()
        .login(&request.email, &request.password)
        .await?;
    let user = state.authenticator().user_profile(session.user_id).await?;

    Ok(Json(SessionResponse {
        token: session.token,
        expires_at: session.expires_at.to_rfc3339(),
        user: user.into(),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;
    Ok(Json(user.into()))
}
