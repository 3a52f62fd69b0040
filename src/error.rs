//! Error types.
//!
//! Only transport and configuration problems are errors in the `Result` sense.
//! Bad span records are reported as [`MalformedSpan`] values next to the spans
//! that survived validation, an empty trace is a regular state, and stale
//! responses are a [`crate::dataflow::Delivery`] variant.

use thiserror::Error;

/// Why a raw span record was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Malformation {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("field `{0}` is not an integer nanosecond timestamp")]
    NotATimestamp(&'static str),
}

/// A span record that was dropped by the validator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("span record #{index}: {reason}")]
pub struct MalformedSpan {
    /// Position of the record in the payload.
    pub index: usize,
    pub reason: Malformation,
}

/// A request to one of the trace services did not produce a usable payload.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("invalid request url: {0}")]
    Url(String),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchFailure::Decode(err.to_string())
        } else {
            FetchFailure::Transport(err)
        }
    }
}

impl From<serde_json::Error> for FetchFailure {
    fn from(err: serde_json::Error) -> Self {
        FetchFailure::Decode(err.to_string())
    }
}

/// Invalid configuration values.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
