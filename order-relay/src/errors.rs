use crate::order::PayloadError;
use crate::upstream::UpstreamError;
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for order-relay operations
pub type Result<T, E = OrderRelayError> = std::result::Result<T, E>;

/// Errors that stop the relay service itself
#[derive(Error, Debug)]
pub enum OrderRelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] crate::config::ValidationError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Missing credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),
}

/// Remote step of the relay a failure happened in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Submitting the order to the fulfillment provider
    CreateOrder,
    /// Writing the status back onto the storefront order
    UpdateNote,
}

impl Stage {
    fn upstream_name(&self) -> &'static str {
        match self {
            Stage::CreateOrder => "fulfillment provider",
            Stage::UpdateNote => "storefront",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::CreateOrder => "create_order",
            Stage::UpdateNote => "update_note",
        })
    }
}

/// Why a webhook could not be relayed
#[derive(Error, Debug, PartialEq)]
pub enum RelayError {
    #[error("Method Not Allowed: {0}")]
    MethodNotAllowed(Method),

    #[error("Invalid order data: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("Server configuration error, missing: {}", .0.join(", "))]
    MissingConfiguration(Vec<&'static str>),

    #[error("{stage} rejected by upstream with {status}")]
    UpstreamRejected {
        stage: Stage,
        status: StatusCode,
        body: Value,
    },

    #[error("{stage} got no response: {reason}")]
    UpstreamUnreachable { stage: Stage, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Classifies the final error of a retried remote call.
    pub fn from_upstream(stage: Stage, error: UpstreamError) -> Self {
        match error {
            UpstreamError::Rejected { status, body } => RelayError::UpstreamRejected {
                stage,
                status,
                body,
            },
            UpstreamError::Unreachable(reason) => RelayError::UpstreamUnreachable { stage, reason },
            UpstreamError::Internal(reason) => RelayError::Internal(format!("{stage}: {reason}")),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            RelayError::MissingConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
            RelayError::UpstreamUnreachable { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short tag used for the outcome metric
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MethodNotAllowed(_) => "method_not_allowed",
            RelayError::InvalidPayload(_) => "invalid",
            RelayError::MissingConfiguration(_) => "misconfigured",
            RelayError::UpstreamRejected { .. } => "rejected",
            RelayError::UpstreamUnreachable { .. } => "unreachable",
            RelayError::Internal(_) => "internal",
        }
    }

    fn stage(&self) -> Option<Stage> {
        match self {
            RelayError::UpstreamRejected { stage, .. }
            | RelayError::UpstreamUnreachable { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Human readable summary for the `error` field of the response.
    fn summary(&self) -> String {
        match self {
            RelayError::MethodNotAllowed(_) => "Method Not Allowed".to_string(),
            RelayError::InvalidPayload(_) => "Invalid order data".to_string(),
            RelayError::MissingConfiguration(_) => "Server configuration error".to_string(),
            RelayError::UpstreamRejected { stage, .. } => {
                format!("Request rejected by {}", stage.upstream_name())
            }
            RelayError::UpstreamUnreachable { stage, .. } => {
                format!("No response from {}", stage.upstream_name())
            }
            RelayError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Machine readable detail for the `details` field of the response.
    fn details(&self) -> Value {
        match self {
            RelayError::MethodNotAllowed(method) => Value::String(method.to_string()),
            RelayError::InvalidPayload(e) => Value::String(e.to_string()),
            RelayError::MissingConfiguration(keys) => {
                Value::String(format!("missing configuration: {}", keys.join(", ")))
            }
            RelayError::UpstreamRejected { body, .. } => body.clone(),
            RelayError::UpstreamUnreachable { reason, .. } => Value::String(reason.clone()),
            RelayError::Internal(reason) => Value::String(reason.clone()),
        }
    }
}

/// A failed relay together with whatever already succeeded.
///
/// When the order was created but the note update failed, `compliance_response`
/// holds the provider's creation response so the order can be reconciled by hand.
#[derive(Error, Debug, PartialEq)]
#[error("{error}")]
pub struct RelayFailure {
    pub error: RelayError,
    pub compliance_response: Option<Value>,
}

impl RelayFailure {
    pub fn is_partial(&self) -> bool {
        self.compliance_response.is_some()
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }

    pub fn to_body(&self) -> ErrorBody {
        let missing = match &self.error {
            RelayError::MissingConfiguration(keys) => Some(keys.clone()),
            _ => None,
        };

        ErrorBody {
            error: self.error.summary(),
            details: self.error.details(),
            stage: self.error.stage(),
            missing,
            compliance_response: self.compliance_response.clone(),
        }
    }
}

impl From<RelayError> for RelayFailure {
    fn from(error: RelayError) -> Self {
        RelayFailure {
            error,
            compliance_response: None,
        }
    }
}

/// JSON body returned for every failed webhook
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<&'static str>>,
    #[serde(rename = "complianceResponse", skip_serializing_if = "Option::is_none")]
    pub compliance_response: Option<Value>,
}
