//! Failure classification.
//!
//! Every failure the transport sees goes through exactly one of the functions
//! here and comes out as a [`ClassifiedError`]; the rest of the client only
//! matches on that.

use std::error::Error as _;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;

use crate::envelope;
use crate::error::{ApiError, UNKNOWN_SERVER_ERROR};

static NETWORK_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)network|econnrefused|econnreset|err_network|connection (refused|reset|closed|aborted)|timed? ?out|dns error|broken pipe")
        .expect("valid network signature regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedError {
    /// No response, or a connection-level failure.
    Network(String),
    /// HTTP 401; `message` is whatever the server said, if anything.
    Unauthorized(Option<String>),
    /// Any other HTTP error carrying a usable message.
    Logical {
        status: u16,
        message: String,
        details: Option<String>,
        trace_id: Option<String>,
    },
    Unknown(String),
}

impl ClassifiedError {
    pub fn is_network(&self) -> bool { matches!(self, ClassifiedError::Network(_)) }
}

impl From<ClassifiedError> for ApiError {
    fn from(c: ClassifiedError) -> Self {
        match c {
            ClassifiedError::Network(m) => ApiError::network(m),
            ClassifiedError::Unauthorized(m) => ApiError::unauthorized(m.unwrap_or_else(|| "unauthorized".to_string())),
            ClassifiedError::Logical { status, message, details, trace_id } => {
                ApiError::Logical { status: Some(status), message, details, trace_id }
            }
            ClassifiedError::Unknown(m) => ApiError::unknown(m),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ")
}

/// True when a message reads like a connection failure.
pub fn looks_like_network_failure(message: &str) -> bool {
    NETWORK_SIGNATURE.is_match(message)
}

/// Classify a failure that happened before (or while) reading a response.
pub fn classify_send_error(err: &reqwest::Error) -> ClassifiedError {
    let chain = error_chain(err);
    if err.is_builder() {
        return ClassifiedError::Unknown(chain);
    }
    if err.is_timeout() || err.is_connect() || err.is_request() || looks_like_network_failure(&chain) {
        return ClassifiedError::Network(chain);
    }
    ClassifiedError::Unknown(chain)
}

/// Classify a non-success HTTP status using the (possibly enveloped) error body.
pub fn classify_status(status: StatusCode, body: &Value) -> ClassifiedError {
    if status == StatusCode::UNAUTHORIZED {
        return ClassifiedError::Unauthorized(envelope::error_message(body));
    }
    match envelope::error_message(body) {
        Some(message) => {
            let canonical = envelope::normalize(body);
            ClassifiedError::Logical {
                status: status.as_u16(),
                message,
                details: canonical.details,
                trace_id: canonical.trace_id,
            }
        }
        None => ClassifiedError::Unknown(UNKNOWN_SERVER_ERROR.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_401_is_unauthorized() {
        let c = classify_status(StatusCode::UNAUTHORIZED, &json!({ "message": "token expired" }));
        assert_eq!(c, ClassifiedError::Unauthorized(Some("token expired".into())));
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, &Value::Null), ClassifiedError::Unauthorized(None));
    }

    #[test]
    fn enveloped_error_body_keeps_server_message() {
        let body = json!({ "success": false, "message": "role already exists", "traceId": "00-abc" });
        match classify_status(StatusCode::CONFLICT, &body) {
            ClassifiedError::Logical { status, message, trace_id, .. } => {
                assert_eq!(status, 409);
                assert_eq!(message, "role already exists");
                assert_eq!(trace_id.as_deref(), Some("00-abc"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bodyless_errors_are_unknown() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, &Value::Null),
            ClassifiedError::Unknown(UNKNOWN_SERVER_ERROR.into())
        );
    }

    #[test]
    fn network_signatures() {
        assert!(looks_like_network_failure("error trying to connect: tcp connect error: Connection refused (os error 111)"));
        assert!(looks_like_network_failure("Network Error"));
        assert!(looks_like_network_failure("ERR_NETWORK"));
        assert!(looks_like_network_failure("operation timed out"));
        assert!(!looks_like_network_failure("role already exists"));
    }

    #[test]
    fn conversion_to_api_error() {
        let e: ApiError = ClassifiedError::Unauthorized(None).into();
        assert!(e.is_unauthorized());
        let e: ApiError = ClassifiedError::Logical { status: 400, message: "bad".into(), details: None, trace_id: None }.into();
        assert_eq!(e.http_status(), Some(400));
    }
}
