//! Environment-driven configuration for the client and the proxy server.
//!
//! Both configs load through a lookup closure so tests never touch the
//! process environment; `from_env` is the thin wrapper the binary uses.

use std::path::PathBuf;
use std::time::Duration;

use bill_burner_agent_runtime::AgentRuntimeConfig;
use url::Url;

pub const APP_NAME: &str = "Bill Burner";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const CALLBACK_PATH: &str = "/login-callback";
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub cognito_domain: String,
    pub cognito_client_id: String,
    pub cognito_login_url: Option<String>,
    pub cognito_logout_url: Option<String>,
    pub app_origin: String,
    pub session_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidation {
    pub valid: bool,
    pub missing: Vec<&'static str>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| non_empty(lookup(key));
        Self {
            api_base_url: get("BILL_BURNER_API_BASE_URL")
                .or_else(|| get("BILL_BURNER_API_URL"))
                .unwrap_or_default(),
            cognito_domain: get("BILL_BURNER_COGNITO_DOMAIN").unwrap_or_default(),
            cognito_client_id: get("BILL_BURNER_COGNITO_CLIENT_ID").unwrap_or_default(),
            cognito_login_url: get("BILL_BURNER_COGNITO_LOGIN_URL"),
            cognito_logout_url: get("BILL_BURNER_COGNITO_LOGOUT_URL"),
            app_origin: get("BILL_BURNER_APP_ORIGIN")
                .unwrap_or_else(|| DEFAULT_APP_ORIGIN.to_string()),
            session_file: get("BILL_BURNER_SESSION_FILE").map(PathBuf::from),
        }
    }

    fn origin(&self) -> &str {
        self.app_origin.trim_end_matches('/')
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}{CALLBACK_PATH}", self.origin())
    }

    /// Base URL of the hosted identity provider. A bare domain means https.
    pub fn identity_base(&self) -> Option<Url> {
        let domain = self.cognito_domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            return None;
        }
        let raw = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Url::parse(&raw).ok()
    }

    fn identity_url(&self, path: &str, params: &[(&str, &str)]) -> Option<Url> {
        let mut url = self.identity_base()?;
        url.set_path(path);
        url.query_pairs_mut().extend_pairs(params.iter().copied());
        Some(url)
    }

    pub fn token_endpoint(&self) -> Option<Url> {
        let mut url = self.identity_base()?;
        url.set_path("/oauth2/token");
        Some(url)
    }

    /// Hosted login page for the authorization-code flow, or the explicit override.
    pub fn login_url(&self) -> Option<String> {
        if let Some(url) = &self.cognito_login_url {
            return Some(url.clone());
        }
        if self.cognito_client_id.is_empty() {
            return None;
        }
        let redirect_uri = self.redirect_uri();
        self.identity_url(
            "/login",
            &[
                ("client_id", self.cognito_client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri.as_str()),
            ],
        )
        .map(String::from)
    }

    pub fn logout_url(&self) -> String {
        if let Some(url) = &self.cognito_logout_url {
            return url.clone();
        }
        if !self.cognito_client_id.is_empty() {
            let logout_uri = format!("{}{LOGIN_PATH}", self.origin());
            let url = self.identity_url(
                "/logout",
                &[
                    ("client_id", self.cognito_client_id.as_str()),
                    ("logout_uri", logout_uri.as_str()),
                ],
            );
            if let Some(url) = url {
                return url.into();
            }
        }
        LOGIN_PATH.to_string()
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut missing = Vec::new();
        if self.api_base_url.is_empty() {
            missing.push("BILL_BURNER_API_BASE_URL");
        }
        if self.cognito_login_url.is_none() && self.cognito_domain.is_empty() {
            missing.push("BILL_BURNER_COGNITO_LOGIN_URL or BILL_BURNER_COGNITO_DOMAIN");
        }
        ConfigValidation {
            valid: missing.is_empty(),
            missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub agent_runtime_arn: Option<String>,
    pub region: String,
    pub agent_endpoint: Option<String>,
    pub agent_bearer_token: Option<String>,
    pub agent_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            agent_runtime_arn: None,
            region: DEFAULT_REGION.to_string(),
            agent_endpoint: None,
            agent_bearer_token: None,
            agent_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| non_empty(lookup(key));
        Self {
            agent_runtime_arn: get("AGENTCORE_AGENT_RUNTIME_ARN"),
            region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            agent_endpoint: get("AGENTCORE_ENDPOINT"),
            agent_bearer_token: get("AGENTCORE_BEARER_TOKEN"),
            agent_timeout: get("AGENTCORE_TIMEOUT_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs),
        }
    }

    /// Runtime settings, or `None` when no runtime ARN is configured.
    pub fn agent_runtime(&self) -> Result<Option<AgentRuntimeConfig>, url::ParseError> {
        let Some(arn) = &self.agent_runtime_arn else {
            return Ok(None);
        };
        let mut config = AgentRuntimeConfig::new(arn.clone());
        config.region = self.region.clone();
        config.endpoint = self.agent_endpoint.as_deref().map(Url::parse).transpose()?;
        config.bearer_token = self.agent_bearer_token.clone();
        config.timeout = self.agent_timeout;
        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn cognito_config() -> ClientConfig {
        ClientConfig::from_lookup(lookup(&[
            ("BILL_BURNER_API_BASE_URL", "https://api.x"),
            ("BILL_BURNER_COGNITO_DOMAIN", "auth.example.com"),
            ("BILL_BURNER_COGNITO_CLIENT_ID", "client-1"),
            ("BILL_BURNER_APP_ORIGIN", "https://burner.example.com/"),
        ]))
    }

    #[test]
    fn api_url_falls_back_to_legacy_key() {
        let config = ClientConfig::from_lookup(lookup(&[("BILL_BURNER_API_URL", "https://old")]));
        assert_eq!(config.api_base_url, "https://old");
        assert_eq!(config.app_origin, DEFAULT_APP_ORIGIN);
    }

    #[test]
    fn login_url_is_built_from_domain() {
        let config = cognito_config();
        assert_eq!(
            config.login_url().as_deref(),
            Some("https://auth.example.com/login?client_id=client-1&response_type=code&redirect_uri=https%3A%2F%2Fburner.example.com%2Flogin-callback")
        );
        assert_eq!(
            config.token_endpoint().map(String::from).as_deref(),
            Some("https://auth.example.com/oauth2/token")
        );
    }

    #[test]
    fn login_override_wins() {
        let mut config = cognito_config();
        config.cognito_login_url = Some("https://custom/login".to_string());
        assert_eq!(config.login_url().as_deref(), Some("https://custom/login"));
    }

    #[test]
    fn logout_url_variants() {
        let config = cognito_config();
        assert_eq!(
            config.logout_url(),
            "https://auth.example.com/logout?client_id=client-1&logout_uri=https%3A%2F%2Fburner.example.com%2Flogin"
        );

        let bare = ClientConfig::default();
        assert_eq!(bare.logout_url(), "/login");
        assert_eq!(bare.login_url(), None);
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let config = ClientConfig {
            cognito_domain: "http://127.0.0.1:4000".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.token_endpoint().map(String::from).as_deref(),
            Some("http://127.0.0.1:4000/oauth2/token")
        );
    }

    #[test]
    fn validate_reports_missing_settings() {
        let report = ClientConfig::default().validate();
        assert!(!report.valid);
        assert_eq!(report.missing.len(), 2);
        assert!(cognito_config().validate().valid);
    }

    #[test]
    fn server_config_builds_runtime_settings() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("AGENTCORE_AGENT_RUNTIME_ARN", "arn:runtime"),
            ("AWS_REGION", "eu-central-1"),
            ("AGENTCORE_TIMEOUT_SECS", "30"),
        ]));
        let runtime = config.agent_runtime().unwrap().unwrap();
        assert_eq!(runtime.runtime_arn, "arn:runtime");
        assert_eq!(runtime.region, "eu-central-1");
        assert_eq!(runtime.timeout, Some(Duration::from_secs(30)));

        assert!(ServerConfig::default().agent_runtime().unwrap().is_none());
    }
}
