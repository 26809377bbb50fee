//! Error taxonomy.
//!
//! Only [`HarnessError`] ever leaves a run. Request failures, schema
//! violations and cleanup problems are captured as data in the report.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors that abort a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarnessError {
    /// Invalid configuration, detected before any request is sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested resource subgraph is not a DAG.
    #[error("cyclic resource dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A reference field had no created instance to point at.
    #[error("unresolved reference: {resource}.{field} needs a created `{target}` instance")]
    UnresolvedReference {
        resource: String,
        field: String,
        target: String,
    },
}

impl HarnessError {
    pub fn config(message: impl Into<String>) -> Self {
        HarnessError::Configuration(message.into())
    }
}

/// Classification of a failed request, modelled on reqwest's error predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    Read,
    Invalid,
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestErrorKind::Timeout => "TIMEOUT",
            RequestErrorKind::Connect => "CONNECT_ERROR",
            RequestErrorKind::Dns => "DNS_ERROR",
            RequestErrorKind::Tls => "TLS_ERROR",
            RequestErrorKind::Read => "READ_ERROR",
            RequestErrorKind::Invalid => "INVALID_REQUEST",
        };
        write!(f, "{label}")
    }
}

/// A request that never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A teardown step that did not succeed. Logged and reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub instance: String,
    pub id: String,
    pub message: String,
}
