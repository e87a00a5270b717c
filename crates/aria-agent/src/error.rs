use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Weather lookup failed: {0}")]
    Weather(String),
}

impl From<aria_graph::GraphError> for AgentError {
    fn from(e: aria_graph::GraphError) -> Self {
        AgentError::Init(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
