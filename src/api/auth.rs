use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    errors::AppError,
    middleware::auth::CurrentUser,
    models::{jwt::TokenResponse, user::UserResponse},
    services::auth_service::{Authenticated, LoginRequest, RegisterRequest},
};

#[derive(Serialize)]
pub struct AuthResponse {
    message: &'static str,
    user: UserResponse,
    token: TokenResponse,
}

impl AuthResponse {
    fn new(message: &'static str, outcome: &Authenticated) -> Self {
        Self {
            message,
            user: UserResponse::from(&outcome.user),
            token: TokenResponse::from(&outcome.tokens),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    token: TokenResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    authenticated: bool,
    user_id: String,
    expires_at: DateTime<Utc>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let outcome = state.auth.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new("registration successful", &outcome)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let outcome = state.auth.login(payload).await?;
    Ok(Json(AuthResponse::new("login successful", &outcome)))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let outcome = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(RefreshResponse {
        token: TokenResponse::from(&outcome.tokens),
    }))
}

pub async fn check(Extension(current_user): Extension<CurrentUser>) -> Json<CheckResponse> {
    Json(CheckResponse {
        authenticated: true,
        user_id: current_user.user_id,
        expires_at: current_user.expires_at,
    })
}
