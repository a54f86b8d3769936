//! Error types for minifs

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Protocol Errors ===
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Cluster Errors ===
    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Insufficient capacity: {0}")]
    Capacity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // === Network Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

/// Machine-readable error category carried in error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProtocolError,
    RegistrationError,
    CapacityError,
    NotFound,
    TransportError,
    InternalError,
}

impl Error {
    /// Is this a retryable error?
    ///
    /// Nothing in this crate retries on its own; gateways use this to decide.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Transport(_) | Error::Timeout(_)
        )
    }

    /// Category reported to the peer when this error becomes a reply
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) | Error::Serialization(_) => ErrorKind::ProtocolError,
            Error::Registration(_) => ErrorKind::RegistrationError,
            Error::Capacity(_) => ErrorKind::CapacityError,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Io(_) | Error::Transport(_) | Error::Timeout(_) => ErrorKind::TransportError,
            Error::InvalidConfig(_) | Error::Internal(_) | Error::Other(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Message sent on the wire, without the local `Display` prefix
    pub fn reply_message(&self) -> String {
        match self {
            Error::Protocol(m)
            | Error::Registration(m)
            | Error::Capacity(m)
            | Error::NotFound(m)
            | Error::Transport(m)
            | Error::Timeout(m)
            | Error::InvalidConfig(m)
            | Error::Internal(m)
            | Error::Other(m) => m.clone(),
            Error::Io(e) => e.to_string(),
            Error::Serialization(e) => e.to_string(),
        }
    }

    /// Rebuild a typed error from an error reply.
    /// Replies without a kind are treated as generic failures.
    pub fn from_reply(kind: Option<ErrorKind>, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| "request failed".to_string());
        match kind {
            Some(ErrorKind::ProtocolError) => Error::Protocol(message),
            Some(ErrorKind::RegistrationError) => Error::Registration(message),
            Some(ErrorKind::CapacityError) => Error::Capacity(message),
            Some(ErrorKind::NotFound) => Error::NotFound(message),
            Some(ErrorKind::TransportError) => Error::Transport(message),
            Some(ErrorKind::InternalError) => Error::Internal(message),
            None => Error::Other(message),
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
