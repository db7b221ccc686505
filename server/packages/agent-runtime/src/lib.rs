//! Client for the managed agent runtime that writes burn plans.
//!
//! The proxy handlers never talk to the runtime directly; they build a
//! [`BurnPlanParameters`], render the prompt with [`burn_plan_instructions`]
//! and hand an [`AgentInvocation`] to whatever [`AgentRuntime`] the server was
//! started with.

mod error;
mod http;
mod prompt;

use std::fmt;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

pub use error::AgentRuntimeError;
pub use http::{AgentRuntimeConfig, HttpAgentRuntime, SESSION_ID_HEADER};
pub use prompt::burn_plan_instructions;

pub const DEFAULT_ARCHITECTURE: &str = "mixed";
pub const DEFAULT_BURNING_STYLE: &str = "horizontal";

/// Spend amount as the caller sent it: `"$1000"`, `"₹50000"` or a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(untagged)]
pub enum Amount {
    Text(String),
    Number(f64),
}

impl Amount {
    pub fn is_empty(&self) -> bool {
        match self {
            Amount::Text(text) => text.trim().is_empty(),
            Amount::Number(value) => *value == 0.0 || value.is_nan(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Text(text) => f.write_str(text),
            Amount::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Amount::Number(value) => write!(f, "{value}"),
        }
    }
}

/// Normalized burn-plan inputs, defaults already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct BurnPlanParameters {
    pub amount: Amount,
    pub timeline: u32,
    pub stupidity: String,
    pub architecture: String,
    pub burning_style: String,
    pub model_id: Option<String>,
}

impl BurnPlanParameters {
    pub fn new(amount: Amount, timeline: u32, stupidity: impl Into<String>) -> Self {
        Self {
            amount,
            timeline,
            stupidity: stupidity.into(),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            burning_style: DEFAULT_BURNING_STYLE.to_string(),
            model_id: None,
        }
    }

    pub fn with_architecture(mut self, architecture: Option<String>) -> Self {
        if let Some(architecture) = architecture.filter(|value| !value.trim().is_empty()) {
            self.architecture = architecture;
        }
        self
    }

    pub fn with_burning_style(mut self, burning_style: Option<String>) -> Self {
        if let Some(style) = burning_style.filter(|value| !value.trim().is_empty()) {
            self.burning_style = style;
        }
        self
    }

    pub fn with_model_id(mut self, model_id: Option<String>) -> Self {
        self.model_id = model_id;
        self
    }

    /// JSON payload the runtime entrypoint reads.
    pub fn payload(&self) -> Value {
        let mut payload = json!({
            "prompt": burn_plan_instructions(self),
            "amount": self.amount,
            "timeline": self.timeline,
            "stupidity_level": self.stupidity,
            "architecture": self.architecture,
            "burning_style": self.burning_style,
        });
        if let Some(model_id) = &self.model_id {
            payload["model_id"] = json!(model_id);
        }
        payload
    }
}

/// One call to the runtime.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub session_id: String,
    pub payload: Value,
}

impl AgentInvocation {
    /// Wraps `payload` with a freshly generated runtime session id.
    pub fn new(payload: Value) -> Self {
        Self {
            session_id: new_runtime_session_id(),
            payload,
        }
    }
}

/// The runtime rejects session ids shorter than 33 characters, so a UUID is
/// padded with a slice of a second one.
pub fn new_runtime_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Uuid::new_v4(), &suffix[..5])
}

#[async_trait]
pub trait AgentRuntime: Send + Sync + fmt::Debug {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<Value, AgentRuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_long_enough_and_unique() {
        let first = new_runtime_session_id();
        let second = new_runtime_session_id();
        assert!(first.len() >= 33, "session id too short: {first}");
        assert_eq!(first.len(), 42);
        assert_ne!(first, second);
    }

    #[test]
    fn defaults_apply_for_missing_or_blank_tags() {
        let params = BurnPlanParameters::new(Amount::Text("$1000".into()), 30, "Very stupid")
            .with_architecture(Some("  ".into()))
            .with_burning_style(None);
        assert_eq!(params.architecture, "mixed");
        assert_eq!(params.burning_style, "horizontal");

        let params = params.with_architecture(Some("serverless".into()));
        assert_eq!(params.architecture, "serverless");
    }

    #[test]
    fn payload_carries_normalized_fields() {
        let params = BurnPlanParameters::new(Amount::Number(2500.0), 14, "Brain damage")
            .with_burning_style(Some("vertical".into()))
            .with_model_id(Some("model-x".into()));
        let payload = params.payload();
        assert_eq!(payload["amount"], json!(2500.0));
        assert_eq!(payload["timeline"], json!(14));
        assert_eq!(payload["stupidity_level"], json!("Brain damage"));
        assert_eq!(payload["architecture"], json!("mixed"));
        assert_eq!(payload["burning_style"], json!("vertical"));
        assert_eq!(payload["model_id"], json!("model-x"));
        let prompt = payload["prompt"].as_str().unwrap();
        assert!(prompt.contains("TOTAL AMOUNT SPENT: 2500"));
    }

    #[test]
    fn payload_omits_model_id_when_absent() {
        let params = BurnPlanParameters::new(Amount::Text("$10".into()), 1, "Mildly dumb");
        assert!(params.payload().get("model_id").is_none());
    }

    #[test]
    fn amount_emptiness() {
        assert!(Amount::Text(" ".into()).is_empty());
        assert!(Amount::Number(0.0).is_empty());
        assert!(!Amount::Text("$1".into()).is_empty());
        assert_eq!(Amount::Number(12.5).to_string(), "12.5");
    }
}
