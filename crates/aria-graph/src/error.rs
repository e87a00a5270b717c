use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node '{name}' is already registered")]
    DuplicateNode { name: String },

    #[error("unknown node: {name}")]
    UnknownNode { name: String },

    #[error("snapshot encoding error: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
