use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-side view of an RFC 7807 problem document returned by the server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProblemResponse {
    #[serde(rename = "type", default)]
    pub problem_type: String,
    #[serde(default)]
    pub title: String,
    pub status: u16,
    /// Stable machine-readable error code, e.g. `not_participant`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ProblemResponse {
    /// Whether the server marked the failure as safe to retry.
    pub fn is_retryable(&self) -> bool {
        self.details
            .as_ref()
            .and_then(|details| details.get("retryable"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl std::fmt::Display for ProblemResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status, self.message)
    }
}

impl std::error::Error for ProblemResponse {}
