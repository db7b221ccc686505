//! Authenticated JSON client for the Bill Burner API.

use std::sync::Arc;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::session::Session;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        details: Option<Value>,
    },
    #[error("{0}")]
    Network(String),
    #[error("failed to encode request body: {0}")]
    Encode(String),
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status of the failure; transport failures report 0.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Status { status, .. } => *status,
            _ => 0,
        }
    }
}

/// Issues one request per call against `base_url`, bearer token taken from
/// the shared session at send time.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    session: Arc<Session>,
    http_client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<Session>) -> Self {
        Self::with_http_client(base_url, session, Client::new())
    }

    pub fn with_http_client(
        base_url: impl Into<String>,
        session: Arc<Session>,
        http_client: Client,
    ) -> Self {
        let base_url = base_url.into();
        tracing::debug!(base_url = %base_url, "api client initialized");
        Self {
            base_url,
            session,
            http_client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<T>, ApiError> {
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|err| ApiError::Encode(err.to_string()))?;
        self.send(method, path, body).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        self.send(Method::POST, path, Some(encode(body)?)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        self.send(Method::PUT, path, Some(encode(body)?)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        self.send(Method::PATCH, path, Some(encode(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Option<T>, ApiError> {
        let url = self.url(path);
        let token = self.session.access_token();
        tracing::debug!(method = %method, url = %url, authenticated = token.is_some(), "api request");

        let mut request = self
            .http_client
            .request(method, &url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|err| {
            tracing::warn!(url = %url, error = %err, "api request failed");
            ApiError::Network(err.to_string())
        })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::Network(err.to_string()))?;
        tracing::debug!(status = %status, "api response");

        if !status.is_success() {
            return Err(status_error(status, &bytes));
        }
        if status == StatusCode::NO_CONTENT || bytes.is_empty() {
            return Ok(None);
        }
        let Ok(value) = serde_json::from_slice::<Value>(&bytes) else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| ApiError::Decode(err.to_string()))
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body).map_err(|err| ApiError::Encode(err.to_string()))
}

/// Error message preference: body `message`, then body `error`, then the
/// status line.
fn status_error(status: StatusCode, bytes: &[u8]) -> ApiError {
    let details = serde_json::from_slice::<Value>(bytes).ok();
    let from_body = |key: &str| {
        details
            .as_ref()
            .and_then(|value| value.get(key))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };
    let message = from_body("message")
        .or_else(|| from_body("error"))
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
        });
    ApiError::Status {
        status: status.as_u16(),
        message,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_error_prefers_message_then_error() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            br#"{"message":"bad amount","error":"ignored"}"#,
        );
        assert_eq!(err.to_string(), "bad amount");
        assert_eq!(err.status(), 400);

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, br#"{"error":"boom"}"#);
        assert_eq!(err.to_string(), "boom");
        match err {
            ApiError::Status { details, .. } => assert_eq!(details, Some(json!({ "error": "boom" }))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn status_error_falls_back_to_status_line() {
        let err = status_error(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
    }

    #[test]
    fn network_errors_report_status_zero() {
        assert_eq!(ApiError::Network("refused".into()).status(), 0);
    }
}
