use std::collections::BTreeMap;

use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    AppState,
    errors::AppError,
    middleware::auth::CurrentUser,
    models::user::{Permission, UserResponse, UserStatus},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    nickname: Option<String>,
    email: Option<String>,
    phone_number: Option<String>,
}

pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.find_by_id(&current_user.user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn update_current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let mut user = state.users.find_by_id(&current_user.user_id).await?;

    if let Some(nickname) = payload.nickname {
        if nickname.trim().is_empty() {
            return Err(AppError::BadRequest("nickname must not be empty".into()));
        }
        user.nickname = nickname;
    }
    if let Some(email) = payload.email {
        user.email = email;
    }
    if let Some(phone_number) = payload.phone_number {
        user.phone_number = phone_number;
    }

    state.users.update(&user).await?;
    info!(user_id = %user.id, "Profile updated");
    Ok(Json(UserResponse::from(&user)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    state.auth.logout(&current_user.user_id).await?;
    Ok(Json(json!({ "message": "logged out" })))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    status: UserStatus,
}

pub async fn get_status(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let user = state.users.find_by_id(&current_user.user_id).await?;
    Ok(Json(json!({ "status": user.status })))
}

/// Overwrite the status flag only; the stored session is left as it is.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let mut user = state.users.find_by_id(&current_user.user_id).await?;
    user.status = payload.status;
    state.users.update(&user).await?;
    info!(user_id = %user.id, status = user.status.as_str(), "User status updated");
    Ok(Json(json!({ "message": "user status updated", "status": user.status })))
}

pub async fn get_permissions(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<BTreeMap<Permission, bool>>, AppError> {
    let user = state.users.find_by_id(&current_user.user_id).await?;
    Ok(Json(user.permissions))
}

/// Merge the given flags into the stored ones; permissions not mentioned keep their value.
pub async fn update_permissions(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(changes): Json<BTreeMap<Permission, bool>>,
) -> Result<Json<BTreeMap<Permission, bool>>, AppError> {
    let mut user = state.users.find_by_id(&current_user.user_id).await?;
    user.permissions.extend(changes);
    state.users.update(&user).await?;
    Ok(Json(user.permissions))
}
