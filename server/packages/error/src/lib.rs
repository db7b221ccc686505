//! Error taxonomy shared by the Bill Burner proxy handlers.
//!
//! Every failure that reaches an HTTP caller is a [`BurnerError`]. The router
//! turns it into an [`ErrorEnvelope`], the flat `{"error": ..}` JSON body the
//! browser client already knows how to read.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub const REQUIRED_BURN_PLAN_FIELDS: [&str; 3] = ["amount", "timeline", "stupidity"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    MissingFields,
    NotFound,
    MethodNotAllowed,
    NotConfigured,
    Agent,
    Internal,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::MissingFields => "missing_fields",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::NotConfigured => "not_configured",
            Self::Agent => "agent",
            Self::Internal => "internal",
        }
    }
}

/// Body returned for every non-success response.
///
/// `status` is only present on server-side failures (`"error"`); validation
/// failures carry just the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum BurnerError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("Missing required fields: {}", fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },
    #[error("Not found: {path}")]
    NotFound { path: String },
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("{setting} not configured")]
    NotConfigured { setting: String },
    #[error("{message}")]
    Agent {
        message: String,
        /// Seconds the runtime asked callers to wait, when it throttled us.
        retry_after: Option<u64>,
    },
    #[error("{message}")]
    Internal { message: String },
}

impl BurnerError {
    /// Missing-field error listing every field the burn-plan handler requires.
    pub fn missing_burn_plan_fields() -> Self {
        Self::MissingFields {
            fields: REQUIRED_BURN_PLAN_FIELDS.to_vec(),
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Agent { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::MissingFields { .. } => ErrorType::MissingFields,
            Self::NotFound { .. } => ErrorType::NotFound,
            Self::MethodNotAllowed => ErrorType::MethodNotAllowed,
            Self::NotConfigured { .. } => ErrorType::NotConfigured,
            Self::Agent { .. } => ErrorType::Agent,
            Self::Internal { .. } => ErrorType::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } | Self::MissingFields { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::MethodNotAllowed => 405,
            Self::NotConfigured { .. } | Self::Agent { .. } | Self::Internal { .. } => 500,
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        let envelope = ErrorEnvelope::new(self.to_string());
        if self.status_code() >= 500 {
            envelope.with_status("error")
        } else {
            envelope
        }
    }
}
