//! # Summary
//!
//! Error types for the two boundaries where a caller can usefully act on
//! failure: the wire codec and configuration loading. Everywhere else the
//! protocol's error policy is "log and drop" (see the role modules), so no
//! `Result` is threaded through message handling.

/// Failure decoding a [`crate::message::WireMessage`] into a domain
/// [`crate::message::Message`], or serializing/deserializing the wire form.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("unrecognized msg_type {0:?}")]
    UnknownKind(String),

    #[error("message kind {kind:?} is missing required field {field:?}")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure loading, validating, or saving a [`crate::roster::Roster`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(std::path::PathBuf),

    #[error("invalid configuration format: {0}")]
    Invalid(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
