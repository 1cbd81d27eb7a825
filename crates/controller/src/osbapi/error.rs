//! # Broker Error Types
//!
//! Errors returned by the OSBAPI client, with classification of terminal vs
//! retryable failures.

use paths::Operation;
use thiserror::Error;

/// Longest broker response body kept in an error message
const MAX_ERROR_BODY_LEN: usize = 512;

/// Broker request error
#[derive(Debug, Error)]
pub enum BrokerError {
    /// 410: the broker no longer knows the instance or binding
    #[error("{operation}: the broker reports the resource is gone (410)")]
    Gone { operation: Operation },
    /// 409 on bind: the binding already exists
    #[error("{operation}: the broker reports the binding already exists (409)")]
    Conflict { operation: Operation },
    /// Any other status outside the operation's success set
    #[error("{operation}: the broker responded with status {status}: {body}")]
    UnexpectedStatus {
        operation: Operation,
        status: u16,
        body: String,
    },
    /// Connection, TLS, timeout or cancellation failure
    #[error("{operation}: request failed: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation}: failed to decode broker response: {source}")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid broker url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// How a caller must react to a [`BrokerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Resource already absent; deletion flows treat it as success
    Gone,
    /// Binding already exists; proceed to read it
    Conflict,
    /// The broker rejected the request; retrying unchanged input cannot succeed
    Unrecoverable,
    /// Network failure, timeout or server error; retry with backoff
    Recoverable,
}

impl ErrorClass {
    /// Label used for metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gone => "gone",
            Self::Conflict => "conflict",
            Self::Unrecoverable => "unrecoverable",
            Self::Recoverable => "recoverable",
        }
    }
}

impl BrokerError {
    pub(crate) fn unexpected_status(operation: Operation, status: u16, body: &[u8]) -> Self {
        let mut body = String::from_utf8_lossy(body).trim().to_owned();
        if body.len() > MAX_ERROR_BODY_LEN {
            let mut cut = MAX_ERROR_BODY_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("...");
        }
        Self::UnexpectedStatus {
            operation,
            status,
            body,
        }
    }

    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Gone { .. } => ErrorClass::Gone,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::UnexpectedStatus { status, .. } => classify_status(*status),
            // Only an edit of the broker resource can fix its url
            Self::InvalidUrl { .. } => ErrorClass::Unrecoverable,
            Self::Transport { .. } | Self::Decode { .. } => ErrorClass::Recoverable,
        }
    }

    pub fn is_gone(&self) -> bool {
        self.class() == ErrorClass::Gone
    }

    pub fn is_conflict(&self) -> bool {
        self.class() == ErrorClass::Conflict
    }

    pub fn is_unrecoverable(&self) -> bool {
        self.class() == ErrorClass::Unrecoverable
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    /// HTTP status carried by the error, if the broker answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Gone { .. } => Some(410),
            Self::Conflict { .. } => Some(409),
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            Self::Decode { .. } | Self::InvalidUrl { .. } => None,
        }
    }
}

/// Classify an unexpected HTTP status
///
/// 4xx client errors are terminal, except 408 Request Timeout and
/// 429 Too Many Requests which describe a transient broker condition.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 => ErrorClass::Recoverable,
        400..=499 => ErrorClass::Unrecoverable,
        _ => ErrorClass::Recoverable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_unrecoverable() {
        for status in [400, 401, 403, 404, 409, 412, 422] {
            assert_eq!(classify_status(status), ErrorClass::Unrecoverable, "{status}");
        }
    }

    #[test]
    fn transient_statuses_are_recoverable() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert_eq!(classify_status(status), ErrorClass::Recoverable, "{status}");
        }
    }

    #[test]
    fn gone_and_conflict_are_distinguished() {
        let gone = BrokerError::Gone {
            operation: Operation::Deprovision,
        };
        let conflict = BrokerError::Conflict {
            operation: Operation::Bind,
        };
        assert!(gone.is_gone());
        assert!(!gone.is_unrecoverable());
        assert!(conflict.is_conflict());
        assert!(!conflict.is_recoverable());
        assert_eq!(gone.status(), Some(410));
    }

    #[test]
    fn provision_409_is_unrecoverable_not_conflict() {
        let err = BrokerError::unexpected_status(Operation::Provision, 409, b"{}");
        assert_eq!(err.class(), ErrorClass::Unrecoverable);
    }

    #[test]
    fn malformed_broker_url_is_unrecoverable() {
        let err = BrokerError::InvalidUrl {
            url: "not a url".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(err.class(), ErrorClass::Unrecoverable);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "é".repeat(MAX_ERROR_BODY_LEN);
        let err = BrokerError::unexpected_status(Operation::Bind, 500, body.as_bytes());
        let BrokerError::UnexpectedStatus { body, .. } = err else {
            panic!("expected UnexpectedStatus");
        };
        assert!(body.ends_with("..."));
        assert!(body.len() <= MAX_ERROR_BODY_LEN + 3);
    }

    #[test]
    fn error_message_names_operation_and_status() {
        let err = BrokerError::unexpected_status(Operation::Provision, 400, b"bad plan");
        assert_eq!(
            err.to_string(),
            "provision: the broker responded with status 400: bad plan"
        );
    }
}
