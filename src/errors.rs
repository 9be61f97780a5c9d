//! Error types for pipeline translation.
//!
//! Every error here is fatal to the translation that raised it. A
//! partially translated dataflow has dangling bindings and is never
//! safe to run, so nothing is retried or logged-and-ignored; errors
//! surface synchronously to whoever called
//! [`crate::translate::translate`] or one of the runners in
//! [`crate::run`].

use crate::coders::CoderError;
use crate::window::DecodeError;

/// Result type used in the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No handler is registered for a transform's URN.
    #[error("unknown type of URN {urn:?} for transform with id {transform_id:?}")]
    UnknownTransformKind { urn: String, transform_id: String },

    /// A handler asked for a collection that no earlier handler (or
    /// caller) bound. Indicates a malformed graph or an ordering bug.
    #[error("unknown stream for collection {0:?}")]
    CollectionNotBound(String),

    /// A collection was bound twice to different streams.
    #[error("collection {0:?} is already bound to a different stream")]
    ConflictingBinding(String),

    /// An opaque payload or descriptor could not be decoded.
    #[error("unable to decode {what} {descriptor}")]
    MalformedPayload {
        what: String,
        /// The offending descriptor, rendered lossily.
        descriptor: String,
        #[source]
        source: DecodeError,
    },

    /// A window function we can decode, but not execute.
    #[error("window function {urn:?} is not supported")]
    UnsupportedWindowFn { urn: String },

    /// A transform kind that is recognized but deliberately not
    /// translated.
    #[error("translation of {urn:?} (transform {transform_id:?}) is not implemented")]
    NotImplemented { urn: String, transform_id: String },

    /// A component id (transform, collection, coder, windowing
    /// strategy) that is not declared in the pipeline.
    #[error("unknown {kind} {id:?} referenced in pipeline")]
    UnknownComponent { kind: &'static str, id: String },

    #[error("transform {transform_id:?} is malformed: {reason}")]
    MalformedTransform {
        transform_id: String,
        reason: String,
    },

    #[error("coder {coder_id:?} is malformed: {reason}")]
    MalformedCoder { coder_id: String, reason: String },

    #[error("coder {coder_id:?} must be a {expected} coder, found {actual:?}")]
    UnexpectedCoder {
        coder_id: String,
        expected: &'static str,
        actual: String,
    },

    #[error("cycle detected involving transform {0:?}")]
    CycleDetected(String),

    #[error(transparent)]
    Coder(#[from] CoderError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("metrics error: {0}")]
    Metrics(String),

    /// A timely worker failed or panicked while running the
    /// translated dataflow.
    #[error("worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Wrap a payload decoding failure with the payload that caused
    /// it.
    pub(crate) fn malformed_payload(
        what: impl Into<String>,
        payload: &[u8],
        source: DecodeError,
    ) -> Self {
        Self::MalformedPayload {
            what: what.into(),
            descriptor: String::from_utf8_lossy(payload).into_owned(),
            source,
        }
    }

    pub(crate) fn malformed_transform(transform_id: &str, reason: impl Into<String>) -> Self {
        Self::MalformedTransform {
            transform_id: transform_id.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Prepend the name of the current thread to each line,
/// if present.
pub(crate) fn prepend_tname(msg: String) -> String {
    let tname = std::thread::current()
        .name()
        .unwrap_or("unnamed-thread")
        .to_string();
    msg.lines()
        .map(|line| format!("<{tname}> {line}\n"))
        .collect()
}
