use thiserror::Error;

/// Error types shared by the console crates
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Session encode error: {0}")]
    SessionEncode(String),

    #[error("Session decode error: {0}")]
    SessionDecode(String),

    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<jsonwebtoken::errors::Error> for ConsoleError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        ConsoleError::SessionDecode(e.to_string())
    }
}

/// Type alias for Results using ConsoleError
pub type Result<T> = std::result::Result<T, ConsoleError>;
