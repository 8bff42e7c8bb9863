// src/services/jwt_service.rs
use crate::config::Config;
use crate::models::jwt::{Claims, ISSUER, TokenClass, TokenPair, VerifiedToken};

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::Error as JwtError, errors::ErrorKind, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(#[source] JwtError),
    #[error("failed to sign token: {0}")]
    Encode(#[source] JwtError),
    #[error("access and refresh keys must be distinct and non-empty")]
    MisconfiguredKeys,
}

struct ClassKeys {
    enc_key: EncodingKey,
    dec_key: DecodingKey,
}

impl ClassKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            enc_key: EncodingKey::from_secret(secret.as_bytes()),
            dec_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and checks identity tokens. Pure: no I/O, time is always passed in
/// or read from the wall clock at the call site.
pub struct JwtService {
    access: ClassKeys,
    refresh: ClassKeys,
    validation: Validation,
}

impl JwtService {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Result<Self, TokenError> {
        if access_secret.is_empty() || refresh_secret.is_empty() || access_secret == refresh_secret
        {
            return Err(TokenError::MisconfiguredKeys);
        }

        // Time window is checked by hand against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        Ok(Self {
            access: ClassKeys::from_secret(access_secret),
            refresh: ClassKeys::from_secret(refresh_secret),
            validation,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TokenError> {
        Self::new(&config.access_token_secret, &config.refresh_token_secret)
    }

    /* ---------- PUBLIC API ---------- */

    /// Sign a token of `class` for `subject`, valid from `now`.
    pub fn issue(
        &self,
        subject: &str,
        class: TokenClass,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims::new(subject, class, now);
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(class).enc_key)
            .map_err(TokenError::Encode)
    }

    /// Issue a fresh access/refresh pair.
    #[instrument(skip(self))]
    pub fn issue_pair(&self, subject: &str, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue(subject, TokenClass::Access, now)?,
            refresh_token: self.issue(subject, TokenClass::Refresh, now)?,
            access_expires_at: now + TokenClass::Access.lifetime(),
        })
    }

    /// Check `token` against the key of one class only.
    pub fn verify_as(
        &self,
        token: &str,
        class: TokenClass,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, TokenError> {
        let claims = decode::<Claims>(token, &self.keys(class).dec_key, &self.validation)
            .map_err(TokenError::Invalid)?
            .claims;

        let now = now.timestamp();
        if claims.exp <= now {
            return Err(TokenError::Invalid(ErrorKind::ExpiredSignature.into()));
        }
        if claims.nbf > now {
            return Err(TokenError::Invalid(ErrorKind::ImmatureSignature.into()));
        }

        Ok(VerifiedToken { class, claims })
    }

    /// Accept either class: the access key is tried first, then the refresh key.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, TokenError> {
        match self.verify_as(token, TokenClass::Access, now) {
            Ok(verified) => Ok(verified),
            Err(access_err) => {
                debug!(error = %access_err, "Access key rejected token, trying refresh key");
                self.verify_as(token, TokenClass::Refresh, now)
            }
        }
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /* ---------- PRIVATE HELPERS ---------- */

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }
}
