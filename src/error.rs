//! Error taxonomy for the connection pipeline.
//!
//! Framing and parsing failures are [`RequestError`]s and are answered with a
//! fixed 4xx response by the connection layer. Failures after a handler has
//! been selected are [`DispatchError`]s and always become the fixed 500
//! response. Neither kind ever escapes a worker.

use std::io;
use thiserror::Error;

use crate::dispatcher::ParameterKind;

/// Errors raised while framing or parsing a request off the wire.
#[derive(Debug, Error)]
pub enum RequestError {
    /// A required delimiter is missing or a line does not have the expected shape.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// The declared `Content-Length` exceeds the configured body limit.
    #[error("request body too large: {declared} bytes (limit {limit})")]
    BodyTooLarge {
        /// Value of the `Content-Length` header
        declared: u64,
        /// Configured body limit
        limit: u64,
    },

    /// The socket failed while the request was being read.
    #[error("i/o error while reading request: {0}")]
    Io(#[from] io::Error),
}

impl RequestError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RequestError::Malformed(reason.into())
    }
}

/// Errors raised between route selection and handler completion.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered resolver supports one of the handler's parameters.
    #[error("no argument resolver supports parameter of kind {0}")]
    UnsupportedParameter(ParameterKind),

    /// A resolver claimed the parameter but could not produce a value.
    #[error("failed to resolve parameter `{parameter}`: {source}")]
    Resolver {
        /// Name of the parameter being resolved
        parameter: String,
        /// Underlying resolver failure
        #[source]
        source: anyhow::Error,
    },

    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}
