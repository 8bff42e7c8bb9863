use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::jwt::TokenPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Registered,
    LoggedIn,
    LoggedOut,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Registered => "REGISTERED",
            UserStatus::LoggedIn => "LOGGED_IN",
            UserStatus::LoggedOut => "LOGGED_OUT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "REGISTERED" => Some(UserStatus::Registered),
            "LOGGED_IN" => Some(UserStatus::LoggedIn),
            "LOGGED_OUT" => Some(UserStatus::LoggedOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Alarm,
    Notification,
    Location,
    Storage,
    Calendar,
    Contacts,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::Alarm,
        Permission::Notification,
        Permission::Location,
        Permission::Storage,
        Permission::Calendar,
        Permission::Contacts,
    ];
}

/// The token pair currently recognised for a user. Replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
}

impl From<&TokenPair> for Session {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            access_expires_at: pair.access_expires_at,
            refresh_token: pair.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub nickname: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub permissions: BTreeMap<Permission, bool>,
    pub session: Option<Session>,
}

impl User {
    pub fn new(username: &str, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            nickname: String::new(),
            email: String::new(),
            phone_number: String::new(),
            password_hash,
            status: UserStatus::Registered,
            created_at: now,
            last_login_at: None,
            permissions: Permission::ALL.iter().map(|p| (*p, false)).collect(),
            session: None,
        }
    }

    /// Install a fresh session and mark the user as logged in.
    pub fn logged_in(self, session: Session, now: DateTime<Utc>) -> Self {
        Self {
            status: UserStatus::LoggedIn,
            last_login_at: Some(now),
            session: Some(session),
            ..self
        }
    }

    /// Swap the current session without touching login bookkeeping.
    pub fn with_session(self, session: Session) -> Self {
        Self {
            session: Some(session),
            ..self
        }
    }

    pub fn logged_out(self) -> Self {
        Self {
            status: UserStatus::LoggedOut,
            session: None,
            ..self
        }
    }

    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.access_expires_at)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub nickname: String,
    pub email: String,
    pub phone_number: String,
    pub status: UserStatus,
    pub created_date: DateTime<Utc>,
    pub last_login_date: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            status: user.status,
            created_date: user.created_at,
            last_login_date: user.last_login_at,
        }
    }
}
