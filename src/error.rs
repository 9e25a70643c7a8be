//! Unified client error model.
//! Every failure path of the transport, refresh and helper layers ends up as one
//! of these variants so UI code has a single thing to render.

use thiserror::Error;

pub const INVALID_RESPONSE: &str = "invalid response";
pub const SERVER_UNREACHABLE: &str = "server unreachable";
pub const UNKNOWN_SERVER_ERROR: &str = "unknown server error";
pub const OPERATION_FAILED: &str = "operation failed";
pub const OPERATION_SUCCEEDED: &str = "operation completed successfully";
pub const SESSION_EXPIRED: &str = "session expired, please log in again";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No response could be obtained, after retries where applicable.
    #[error("{message}")]
    Network { message: String },
    /// The caller must authenticate again.
    #[error("{message}")]
    Unauthorized { message: String },
    /// The server answered and said no.
    #[error("{message}")]
    Logical {
        status: Option<u16>,
        message: String,
        details: Option<String>,
        trace_id: Option<String>,
    },
    /// The payload did not match the expected type.
    #[error("{message}")]
    Decode { message: String },
    #[error("{message}")]
    Storage { message: String },
    #[error("{message}")]
    Unknown { message: String },
}

impl ApiError {
    pub fn code_str(&self) -> &str {
        match self {
            ApiError::Network { .. } => "network",
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::Logical { .. } => "logical",
            ApiError::Decode { .. } => "decode",
            ApiError::Storage { .. } => "storage",
            ApiError::Unknown { .. } => "unknown",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message }
            | ApiError::Unauthorized { message }
            | ApiError::Logical { message, .. }
            | ApiError::Decode { message }
            | ApiError::Storage { message }
            | ApiError::Unknown { message } => message.as_str(),
        }
    }

    pub fn network<S: Into<String>>(msg: S) -> Self { ApiError::Network { message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self { ApiError::Unauthorized { message: msg.into() } }
    pub fn logical<S: Into<String>>(msg: S) -> Self {
        ApiError::Logical { status: None, message: msg.into(), details: None, trace_id: None }
    }
    pub fn decode<S: Into<String>>(msg: S) -> Self { ApiError::Decode { message: msg.into() } }
    pub fn storage<S: Into<String>>(msg: S) -> Self { ApiError::Storage { message: msg.into() } }
    pub fn unknown<S: Into<String>>(msg: S) -> Self { ApiError::Unknown { message: msg.into() } }

    pub fn is_network(&self) -> bool { matches!(self, ApiError::Network { .. }) }
    pub fn is_unauthorized(&self) -> bool { matches!(self, ApiError::Unauthorized { .. }) }

    /// HTTP status that produced this error, when one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Logical { status, .. } => *status,
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // anyhow only surfaces from the persistence layer
        ApiError::Storage { message: err.to_string() }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode { message: err.to_string() }
    }
}
