//! Error taxonomy for the interception engine.

use crate::types::matcher::AnnotatedRouteMatcher;
use crate::types::request::RequestData;
use thiserror::Error;

/// Programmer errors in handler code. Always fatal to the current test step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolMisuse {
    #[error("`req.reply()` was called after the request had already been sent")]
    ReplyCalledAfterResolved,
    #[error("`req.reply()` was called multiple times in a request handler, but a request can only be replied to once")]
    MultipleReplyCalls,
    #[error("a continuation frame was already sent for request `{request_id}`")]
    DoubleContinuation { request_id: String },
    #[error("`res.send()` was called after the response had already been sent")]
    SendCalledAfterResolved,
    #[error("`res.send()` was called multiple times in a response handler, but a response can only be sent once")]
    MultipleSendCalls,
    #[error("invalid static response passed to `{context}`: {reason}")]
    InvalidStaticResponse { context: String, reason: String },
}

/// Errors surfaced by the route registry and the lifecycle controllers.
#[derive(Debug, Error)]
pub enum NetStubError {
    #[error(transparent)]
    ProtocolMisuse(#[from] ProtocolMisuse),

    #[error("a handler for route `{handler_id}` failed: {source}")]
    HandlerRuntime {
        handler_id: String,
        request: Box<RequestData>,
        route: Box<AnnotatedRouteMatcher>,
        #[source]
        source: anyhow::Error,
    },

    #[error("a handler for route `{handler_id}` did not finish within {timeout_ms}ms")]
    HandlerTimeout {
        handler_id: String,
        timeout_ms: u64,
        request: Box<RequestData>,
        route: Box<AnnotatedRouteMatcher>,
    },

    #[error("failed to load fixture `{fixture}`: {reason}")]
    FixtureLoad { fixture: String, reason: String },

    #[error("unrecognized net event: {event}")]
    UnrecognizedEvent { event: String },

    #[error("invalid `{field}` matcher `{value}`: {reason}")]
    InvalidMatcher {
        field: String,
        value: String,
        reason: String,
    },

    #[error("malformed `{event}` frame: {source}")]
    MalformedFrame {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("event channel closed")]
    ChannelClosed,
}

impl NetStubError {
    /// Whether the error must stop the dispatch loop that observed it.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(self, NetStubError::UnrecognizedEvent { .. })
    }
}

pub type Result<T, E = NetStubError> = std::result::Result<T, E>;
