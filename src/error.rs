//! Error types for the driver protocol.
//!
//! Every failure maps onto one [`ErrorKind`]; the kind decides whether the
//! handle that produced it can still be used.

use std::time::Duration;

use thiserror::Error;

use crate::proto::StatusCode;

#[derive(Error, Debug)]
pub enum DbmiError {
    /// The call does not match the catalog entry. Nothing was sent.
    #[error("Invalid arguments for {procedure}: {reason}")]
    Argument {
        procedure: &'static str,
        reason: String,
    },

    /// The driver ran the procedure and reported a failure status.
    #[error("{procedure} failed with {status}{}", diagnostic_suffix(.diagnostic))]
    Operation {
        procedure: &'static str,
        status: StatusCode,
        diagnostic: Option<String>,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Driver connection error: {0}")]
    Connection(String),

    #[error("Driver did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn diagnostic_suffix(diagnostic: &Option<String>) -> String {
    match diagnostic {
        Some(msg) if !msg.is_empty() => format!(": {}", msg),
        _ => String::new(),
    }
}

/// Error families of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    Operation,
    Protocol,
    Connection,
    Config,
}

impl DbmiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbmiError::Argument { .. } => ErrorKind::Argument,
            DbmiError::Operation { .. } => ErrorKind::Operation,
            DbmiError::Protocol(_) => ErrorKind::Protocol,
            DbmiError::Connection(_) | DbmiError::Timeout(_) | DbmiError::Io(_) => {
                ErrorKind::Connection
            }
            DbmiError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the handle that produced this error must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Protocol | ErrorKind::Connection)
    }

    /// The diagnostic text a driver attached to a failed operation.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            DbmiError::Operation { diagnostic, .. } => diagnostic.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        DbmiError::Protocol(msg.into())
    }

    pub(crate) fn connection(msg: impl Into<String>) -> Self {
        DbmiError::Connection(msg.into())
    }
}

pub type DbmiResult<T> = std::result::Result<T, DbmiError>;
