//! Session tokens carried in a cookie.
//!
//! The cookie holds the OAuth token as base64url-encoded JSON. The token
//! is opaque to the capture and crop pipeline; only the HTTP layer checks
//! its expiry before calling remote storage.

#[cfg(feature = "server")]
mod oauth;

#[cfg(feature = "server")]
pub use oauth::{OAuthClient, AUTH_URL, SCOPES, TOKEN_URL};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the session cookie.
pub const COOKIE_NAME: &str = "access_token";

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session cookie was sent.
    #[error("no session cookie")]
    Missing,
    /// The cookie is not a token this server issued.
    #[error("malformed session cookie: {0}")]
    Malformed(String),
    /// The token has expired.
    #[error("session token expired")]
    Expired,
    /// The provider refused the authorization code.
    #[error("token exchange failed: {0}")]
    Exchange(String),
}

/// An OAuth access token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Bearer token for storage calls.
    pub access_token: String,
    /// Refresh token, when one was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// When the access token stops working.
    pub expiry: DateTime<Utc>,
}

impl SessionToken {
    /// A bearer token without a refresh token.
    pub fn new(access_token: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
            expiry,
        }
    }

    /// Whether the token has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Fails with [`SessionError::Expired`] once the expiry has passed.
    pub fn ensure_valid(&self) -> Result<(), SessionError> {
        if self.is_expired_at(Utc::now()) {
            return Err(SessionError::Expired);
        }
        Ok(())
    }

    /// Cookie value for this token.
    pub fn encode(&self) -> Result<String, SessionError> {
        let json = serde_json::to_vec(self).map_err(|e| SessionError::Malformed(e.to_string()))?;
        Ok(URL_SAFE.encode(json))
    }

    /// Parses a cookie value produced by [`SessionToken::encode`].
    pub fn decode(value: &str) -> Result<Self, SessionError> {
        let json = URL_SAFE
            .decode(value.trim())
            .map_err(|e| SessionError::Malformed(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| SessionError::Malformed(e.to_string()))
    }

    /// Full `Set-Cookie` header value.
    pub fn set_cookie(&self) -> Result<String, SessionError> {
        Ok(format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            COOKIE_NAME,
            self.encode()?
        ))
    }

    /// Reads the session token out of a `Cookie` request header.
    pub fn from_cookie_header(header: &str) -> Result<Self, SessionError> {
        let value = header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == COOKIE_NAME)
            .map(|(_, value)| value)
            .ok_or(SessionError::Missing)?;
        Self::decode(value)
    }
}
