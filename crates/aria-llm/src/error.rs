use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("response is not valid JSON: {0}")]
    Parse(String),

    #[error("schema validation failed: {0}")]
    Schema(String),
}

impl LlmError {
    /// True for structural failures the caller must not retry blindly.
    pub fn is_structural(&self) -> bool {
        matches!(self, LlmError::Schema(_) | LlmError::Parse(_))
    }
}
