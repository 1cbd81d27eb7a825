//! Errors raised while building broker paths.

use std::fmt;

/// Error returned by [`crate::PathBuilder::build`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathBuilderError {
    /// The operation needs an instance ID and none was supplied
    MissingInstanceId(&'static str),
    /// The operation needs a binding ID and none was supplied
    MissingBindingId(&'static str),
    /// An ID contained a character that would change the path structure
    InvalidId(String),
}

impl fmt::Display for PathBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInstanceId(op) => write!(f, "operation {op} requires an instance id"),
            Self::MissingBindingId(op) => write!(f, "operation {op} requires a binding id"),
            Self::InvalidId(id) => write!(f, "id {id:?} is not a valid path segment"),
        }
    }
}

impl std::error::Error for PathBuilderError {}
