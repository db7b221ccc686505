//! Hosted-UI login flow against the Cognito identity provider.
//!
//! `login` and `logout` hand back the URL the user agent should visit; only
//! `handle_callback` touches the network, and only once per call.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::config::ClientConfig;
use crate::session::{Session, SessionError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    TokenExchange(String),
    #[error("No authentication code or tokens found")]
    MissingCredentials,
    #[error("Cognito configuration missing")]
    Configuration,
    #[error("invalid callback url: {0}")]
    InvalidCallback(String),
    #[error("network error: {0}")]
    Network(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Tokens arrived directly in the redirect.
    Implicit,
    /// An authorization code was exchanged at the token endpoint.
    CodeExchanged,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug)]
pub struct Authenticator {
    config: ClientConfig,
    session: Arc<Session>,
    http_client: Client,
}

impl Authenticator {
    pub fn new(config: ClientConfig, session: Arc<Session>) -> Self {
        Self {
            config,
            session,
            http_client: Client::new(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Hosted login page to send the user to.
    pub fn login(&self) -> Result<String, AuthError> {
        self.config.login_url().ok_or(AuthError::Configuration)
    }

    /// Clears the session and returns the identity provider's logout URL.
    pub fn logout(&self) -> Result<String, AuthError> {
        self.session.clear()?;
        tracing::info!("session cleared");
        Ok(self.config.logout_url())
    }

    pub async fn handle_callback(&self, callback_url: &str) -> Result<CallbackOutcome, AuthError> {
        let url = Url::parse(callback_url)
            .map_err(|err| AuthError::InvalidCallback(err.to_string()))?;
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let fragment: HashMap<String, String> = url
            .fragment()
            .map(|fragment| form_urlencoded::parse(fragment.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let param = |key: &str| {
            query
                .get(key)
                .or_else(|| fragment.get(key))
                .filter(|value| !value.is_empty())
                .cloned()
        };

        if let Some(error) = param("error") {
            let description = param("error_description")
                .unwrap_or_else(|| "Authentication failed".to_string());
            tracing::warn!(error = %error, "identity provider rejected login");
            return Err(AuthError::Authentication(description));
        }

        if let Some(access_token) = param("access_token") {
            let id_token = param("id_token");
            self.session
                .store_tokens(&access_token, id_token.as_deref())?;
            return Ok(CallbackOutcome::Implicit);
        }

        if let Some(code) = param("code") {
            self.exchange_code(&code).await?;
            return Ok(CallbackOutcome::CodeExchanged);
        }

        Err(AuthError::MissingCredentials)
    }

    async fn exchange_code(&self, code: &str) -> Result<(), AuthError> {
        let endpoint = self.config.token_endpoint().ok_or(AuthError::Configuration)?;
        if self.config.cognito_client_id.is_empty() {
            return Err(AuthError::Configuration);
        }
        let redirect_uri = self.config.redirect_uri();

        let response = self
            .http_client
            .post(endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.cognito_client_id.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let description = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("error_description")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "Token exchange failed".to_string());
            tracing::warn!(status = %status, "token exchange rejected");
            return Err(AuthError::TokenExchange(description));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::TokenExchange(format!("invalid token response: {err}")))?;
        let access_token = tokens.access_token.ok_or_else(|| {
            AuthError::TokenExchange("token response missing access_token".to_string())
        })?;
        self.session
            .store_tokens(&access_token, tokens.id_token.as_deref())?;
        tracing::info!("authorization code exchanged");
        Ok(())
    }
}
