//! Google OAuth 2.0 authorization-code flow.

use super::{SessionError, SessionToken};
use crate::capture::OAuthConfig;
use chrono::{Duration, Utc};
use reqwest::Url;
use serde::Deserialize;

/// Google's authorization endpoint.
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google's token endpoint.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested at login.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

/// OAuth client for login redirects and code exchange.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
    token_url: String,
}

impl OAuthClient {
    /// A client for the registered application.
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Whether client credentials are configured at all.
    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.redirect_url.is_empty()
    }

    /// URL the browser is redirected to for consent.
    pub fn authorization_url(&self) -> Result<Url, SessionError> {
        let scope = SCOPES.join(" ");
        Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| SessionError::Exchange(e.to_string()))
    }

    /// Exchanges an authorization code for a session token.
    pub async fn exchange_code(&self, code: &str) -> Result<SessionToken, SessionError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| SessionError::Exchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Exchange(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Exchange(e.to_string()))?;
        tracing::info!("Exchanged authorization code for access token");
        Ok(token.into_session())
    }
}

impl TokenResponse {
    fn into_session(self) -> SessionToken {
        // Tokens without a lifetime are treated as valid for an hour
        let lifetime = self.expires_in.unwrap_or(3600);
        SessionToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expiry: Utc::now() + Duration::seconds(lifetime),
        }
    }
}
