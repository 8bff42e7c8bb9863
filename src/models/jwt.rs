// src/models/jwt.rs
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ISSUER: &str = "todo-app";

/// Seconds an access token stays valid; also advertised in `X-Token-Expires-In`.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Access,
    Refresh,
}

impl TokenClass {
    pub fn lifetime(self) -> Duration {
        match self {
            TokenClass::Access => Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            TokenClass::Refresh => Duration::seconds(REFRESH_TOKEN_TTL_SECS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // user id
    pub iat: i64,    // issued at
    pub nbf: i64,    // not before
    pub exp: i64,    // expiration time
    pub iss: String,
    pub jti: String, // unique per issued token
}

impl Claims {
    pub fn new(subject: &str, class: TokenClass, now: DateTime<Utc>) -> Self {
        let expires_at = now + class.lifetime();

        Self {
            sub: subject.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: ISSUER.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Claims together with the class whose key validated them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub class: TokenClass,
    pub claims: Claims,
}

impl VerifiedToken {
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

/// Wire shape of a freshly issued pair.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl From<&TokenPair> for TokenResponse {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_in: ACCESS_TOKEN_TTL_SECS,
        }
    }
}
