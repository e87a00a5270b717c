use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown transport session: {id}")]
    UnknownTransport { id: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;
