use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{AppState, errors::AppError, models::jwt::TokenClass};

/// Identity the gate attaches to an authenticated request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerError {
    Missing,
    Malformed,
}

impl From<BearerError> for AppError {
    fn from(err: BearerError) -> Self {
        match err {
            BearerError::Missing => AppError::Unauthorized("missing credentials".into()),
            BearerError::Malformed => AppError::Unauthorized("malformed header".into()),
        }
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, BearerError> {
    let value = headers.get(AUTHORIZATION).ok_or(BearerError::Missing)?;
    let value = value.to_str().map_err(|_| BearerError::Malformed)?;
    if value.is_empty() {
        return Err(BearerError::Missing);
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(BearerError::Malformed),
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;

    let verified = state.jwt.verify(token).map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        AppError::Unauthorized("invalid or expired token".into())
    })?;

    // Refresh tokens are only good for the refresh endpoint.
    if verified.class != TokenClass::Access {
        debug!("Refresh token presented as bearer credential");
        return Err(AppError::Unauthorized("invalid or expired token".into()));
    }

    let expires_at = verified.claims.expires_at();
    request.extensions_mut().insert(CurrentUser {
        user_id: verified.claims.sub,
        expires_at,
    });

    Ok(next.run(request).await)
}
