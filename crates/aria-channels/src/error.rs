use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Push channel error: {0}")]
    Push(String),

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("Delivery task failed: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
