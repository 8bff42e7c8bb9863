use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::db::{StoreError, UserStore};
use crate::errors::AppError;
use crate::models::jwt::{TokenClass, TokenPair};
use crate::models::user::{Session, User};
use crate::services::jwt_service::JwtService;
use crate::utils::{
    nickname::random_nickname,
    password::{hash_password, verify_password},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A user together with the pair just issued for them.
#[derive(Debug)]
pub struct Authenticated {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    jwt: Arc<JwtService>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt: Arc<JwtService>, bcrypt_cost: u32) -> Self {
        Self {
            users,
            jwt,
            bcrypt_cost,
        }
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> Result<Authenticated, AppError> {
        let username = request.username.trim();
        if username.is_empty() || request.password.is_empty() {
            return Err(AppError::BadRequest(
                "username and password are required".into(),
            ));
        }

        let password = request.password;
        let cost = self.bcrypt_cost;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .context("password hashing task failed")?
            .context("failed to hash password")?;

        let now = Utc::now();
        let mut user = User::new(username, password_hash, now);
        user.nickname = request
            .nickname
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(random_nickname);
        user.email = request.email.unwrap_or_default();
        user.phone_number = request.phone_number.unwrap_or_default();

        let tokens = self.jwt.issue_pair(&user.id, now)?;
        let user = self
            .users
            .create(user.logged_in(Session::from(&tokens), now))
            .await?;

        info!(user_id = %user.id, "User registered");
        Ok(Authenticated { user, tokens })
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn login(&self, request: LoginRequest) -> Result<Authenticated, AppError> {
        let user = match self.users.find_by_username(&request.username).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                warn!("Login attempt for unknown user");
                return Err(invalid_credentials());
            }
            Err(e) => return Err(e.into()),
        };

        let password = request.password;
        let password_hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .context("password verification task failed")?
            .context("stored password hash is unreadable")?;
        if !matches {
            warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(invalid_credentials());
        }

        let now = Utc::now();
        let tokens = self.jwt.issue_pair(&user.id, now)?;
        let user = user.logged_in(Session::from(&tokens), now);
        self.users.update(&user).await?;

        info!(user_id = %user.id, "User logged in");
        Ok(Authenticated { user, tokens })
    }

    /// Exchange the user's current refresh token for a new pair.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Authenticated, AppError> {
        let now = Utc::now();
        let verified = self
            .jwt
            .verify_as(refresh_token, TokenClass::Refresh, now)
            .map_err(|_| AppError::Unauthorized("invalid or expired refresh token".into()))?;

        let user = self.users.find_by_id(verified.subject()).await?;
        let is_current = user
            .session
            .as_ref()
            .is_some_and(|s| s.refresh_token == refresh_token);
        if !is_current {
            warn!(user_id = %user.id, "Refresh token is not the current one");
            return Err(AppError::Unauthorized(
                "refresh token is no longer valid".into(),
            ));
        }

        let tokens = self.jwt.issue_pair(&user.id, now)?;
        let user = user.with_session(Session::from(&tokens));
        self.users.update(&user).await?;

        info!(user_id = %user.id, "Tokens refreshed");
        Ok(Authenticated { user, tokens })
    }

    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: &str) -> Result<(), AppError> {
        let user = self.users.find_by_id(user_id).await?.logged_out();
        self.users.update(&user).await?;
        info!("User logged out");
        Ok(())
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("invalid username or password".into())
}
