use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unsupported request. The session stays usable.
    InvalidArgument,
    /// Construction-time inconsistency surfaced by the engine. The session is no longer usable.
    Fatal,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SessionError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SessionError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SessionError::InvalidArgument(msg) | SessionError::Fatal(msg) => msg,
        }
    }
}
