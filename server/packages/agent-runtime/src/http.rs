use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use crate::{AgentInvocation, AgentRuntime, AgentRuntimeError};

pub const SESSION_ID_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";
pub const DEFAULT_QUALIFIER: &str = "DEFAULT";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct AgentRuntimeConfig {
    pub runtime_arn: String,
    pub region: String,
    /// Overrides the regional `bedrock-agentcore` endpoint.
    pub endpoint: Option<Url>,
    pub bearer_token: Option<String>,
    pub qualifier: String,
    pub timeout: Option<Duration>,
}

impl AgentRuntimeConfig {
    pub fn new(runtime_arn: impl Into<String>) -> Self {
        Self {
            runtime_arn: runtime_arn.into(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            bearer_token: None,
            qualifier: DEFAULT_QUALIFIER.to_string(),
            timeout: None,
        }
    }

    pub fn invocation_url(&self) -> Result<Url, AgentRuntimeError> {
        let mut url = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let raw = format!("https://bedrock-agentcore.{}.amazonaws.com", self.region);
                Url::parse(&raw).map_err(|err| AgentRuntimeError::Config(err.to_string()))?
            }
        };
        let shown = url.to_string();
        url.path_segments_mut()
            .map_err(|_| AgentRuntimeError::Config(format!("endpoint cannot be a base: {shown}")))?
            .pop_if_empty()
            .extend(["runtimes", self.runtime_arn.as_str(), "invocations"]);
        url.query_pairs_mut()
            .append_pair("qualifier", &self.qualifier);
        Ok(url)
    }
}

#[derive(Debug)]
pub struct HttpAgentRuntime {
    config: AgentRuntimeConfig,
    invocation_url: Url,
    http_client: Client,
}

impl HttpAgentRuntime {
    pub fn new(config: AgentRuntimeConfig) -> Result<Self, AgentRuntimeError> {
        if config.runtime_arn.trim().is_empty() {
            return Err(AgentRuntimeError::Config(
                "agent runtime arn is empty".to_string(),
            ));
        }
        let invocation_url = config.invocation_url()?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|err| AgentRuntimeError::Config(err.to_string()))?;
        Ok(Self {
            config,
            invocation_url,
            http_client,
        })
    }

    pub fn invocation_url(&self) -> &Url {
        &self.invocation_url
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<Value, AgentRuntimeError> {
        let started = Instant::now();
        let mut request = self
            .http_client
            .post(self.invocation_url.clone())
            .header(SESSION_ID_HEADER, invocation.session_id.as_str())
            .json(&invocation.payload);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(AgentRuntimeError::from_transport)?;
        let status = response.status();
        tracing::info!(
            session_id = %invocation.session_id,
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent invocation"
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            return Err(AgentRuntimeError::RateLimited { retry_after });
        }
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(AgentRuntimeError::Timeout(format!("runtime answered {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentRuntimeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(AgentRuntimeError::from_transport)?;
        if is_event_stream {
            return decode_event_stream(&body);
        }
        decode_body(&body)
    }
}

/// Parses the runtime's response body. Entrypoints that return a JSON string
/// holding a serialized object get unwrapped once.
pub(crate) fn decode_body(body: &str) -> Result<Value, AgentRuntimeError> {
    if body.trim().is_empty() {
        return Err(AgentRuntimeError::EmptyResponse);
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|err| AgentRuntimeError::InvalidResponse(err.to_string()))?;
    if let Value::String(inner) = &value {
        if let Ok(nested @ Value::Object(_)) = serde_json::from_str::<Value>(inner) {
            return Ok(nested);
        }
    }
    Ok(value)
}

/// Streaming entrypoints emit `data:` lines; the last decodable one wins.
fn decode_event_stream(body: &str) -> Result<Value, AgentRuntimeError> {
    let mut last = None;
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            if let Ok(value) = decode_body(data.trim()) {
                last = Some(value);
            }
        }
    }
    last.ok_or(AgentRuntimeError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_endpoint_is_regional() {
        let mut config = AgentRuntimeConfig::new("my-runtime");
        config.region = "eu-west-1".to_string();
        let url = config.invocation_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://bedrock-agentcore.eu-west-1.amazonaws.com/runtimes/my-runtime/invocations?qualifier=DEFAULT"
        );
    }

    #[test]
    fn arn_slashes_are_escaped_in_path() {
        let mut config =
            AgentRuntimeConfig::new("arn:aws:bedrock-agentcore:us-east-1:123:runtime/burner");
        config.endpoint = Some(Url::parse("http://127.0.0.1:9000/").unwrap());
        let url = config.invocation_url().unwrap();
        assert_eq!(
            url.path(),
            "/runtimes/arn:aws:bedrock-agentcore:us-east-1:123:runtime%2Fburner/invocations"
        );
    }

    #[test]
    fn opaque_endpoint_is_a_config_error() {
        let mut config = AgentRuntimeConfig::new("my-runtime");
        config.endpoint = Some(Url::parse("mailto:ops@example.com").unwrap());
        match config.invocation_url() {
            Err(AgentRuntimeError::Config(message)) => {
                assert!(message.contains("mailto:ops@example.com"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_arn_is_rejected() {
        let err = HttpAgentRuntime::new(AgentRuntimeConfig::new(" ")).unwrap_err();
        assert!(matches!(err, AgentRuntimeError::Config(_)));
    }

    #[test]
    fn double_encoded_bodies_are_unwrapped() {
        let body = serde_json::to_string(&json!("{\"roast\":\"ouch\"}")).unwrap();
        assert_eq!(decode_body(&body).unwrap(), json!({ "roast": "ouch" }));
        assert_eq!(decode_body("{\"a\":1}").unwrap(), json!({ "a": 1 }));
        assert!(matches!(decode_body("  "), Err(AgentRuntimeError::EmptyResponse)));
        assert!(matches!(
            decode_body("not json"),
            Err(AgentRuntimeError::InvalidResponse(_))
        ));
    }

    #[test]
    fn event_stream_keeps_last_payload() {
        let body = "data: {\"step\":1}\n\ndata: {\"step\":2}\n\n";
        assert_eq!(decode_event_stream(body).unwrap(), json!({ "step": 2 }));
    }
}
