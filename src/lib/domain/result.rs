use super::error::CanonicalError;
use serde::Serialize;
use serde_json::Value;

/// Backend-independent payload returned by every successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalResult {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

pub type ToolOutcome = Result<CanonicalResult, CanonicalError>;

impl CanonicalResult {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Text shown to the MCP client: the summary if one was produced, otherwise pretty JSON.
    pub fn text(&self) -> String {
        match &self.summary {
            Some(summary) => summary.clone(),
            None => serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| self.data.to_string()),
        }
    }
}
