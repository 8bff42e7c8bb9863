use axum::{body::Body, extract::State, middleware::Next, response::Response};
use chrono::{DateTime, Duration, Utc};
use http::{HeaderMap, HeaderValue, Request};
use tracing::{debug, info, instrument, warn};

use crate::{
    AppState,
    middleware::auth::bearer_token,
    models::{
        jwt::{ACCESS_TOKEN_TTL_SECS, TokenClass, TokenPair},
        user::Session,
    },
};

pub const NEW_ACCESS_TOKEN_HEADER: &str = "x-new-access-token";
pub const NEW_REFRESH_TOKEN_HEADER: &str = "x-new-refresh-token";
pub const TOKEN_EXPIRES_IN_HEADER: &str = "x-token-expires-in";

/// Remaining lifetime below which a session is silently renewed.
pub fn refresh_window() -> Duration {
    Duration::hours(12)
}

pub fn needs_refresh(access_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    access_expires_at - now < refresh_window()
}

/// Sliding expiration: after a successful response, reissue the caller's
/// token pair when the stored one is close to expiring.
pub async fn token_refresh_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let headers = request.headers().clone();
    let mut response = next.run(request).await;

    if !response.status().is_success() {
        return response;
    }

    if let Some(pair) = reissue_if_expiring(&state, &headers, Utc::now()).await {
        attach_tokens(response.headers_mut(), &pair);
    }

    response
}

/// Every failure in here is logged and swallowed.
#[instrument(skip_all)]
async fn reissue_if_expiring(
    state: &AppState,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<TokenPair> {
    let token = bearer_token(headers).ok()?;
    let verified = match state.jwt.verify_as(token, TokenClass::Access, now) {
        Ok(verified) => verified,
        Err(e) => {
            debug!(error = %e, "Skipping refresh, token no longer verifies");
            return None;
        }
    };

    let user = match state.users.find_by_id(verified.subject()).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, user_id = %verified.subject(), "Skipping refresh, user lookup failed");
            return None;
        }
    };

    // logged-out users have no session to extend
    let expires_at = user.access_expires_at()?;
    if !needs_refresh(expires_at, now) {
        return None;
    }

    let pair = match state.jwt.issue_pair(&user.id, now) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "Failed to issue refreshed tokens");
            return None;
        }
    };

    let user_id = user.id.clone();
    let renewed = user.with_session(Session::from(&pair));
    if let Err(e) = state.users.update(&renewed).await {
        warn!(error = %e, user_id = %user_id, "Failed to persist refreshed tokens");
        return None;
    }

    info!(user_id = %user_id, "Silently refreshed session tokens");
    Some(pair)
}

fn attach_tokens(headers: &mut HeaderMap, pair: &TokenPair) {
    let values = (
        HeaderValue::from_str(&pair.access_token),
        HeaderValue::from_str(&pair.refresh_token),
    );
    match values {
        (Ok(access), Ok(refresh)) => {
            headers.insert(NEW_ACCESS_TOKEN_HEADER, access);
            headers.insert(NEW_REFRESH_TOKEN_HEADER, refresh);
            headers.insert(TOKEN_EXPIRES_IN_HEADER, HeaderValue::from(ACCESS_TOKEN_TTL_SECS));
        }
        _ => warn!("Refreshed tokens are not valid header values"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_window_is_twelve_hours() {
        let now = Utc::now();
        assert!(needs_refresh(now + Duration::hours(10), now));
        assert!(needs_refresh(now - Duration::hours(1), now));
        assert!(!needs_refresh(now + Duration::hours(18), now));
        assert!(!needs_refresh(now + Duration::hours(12), now));
    }
}
