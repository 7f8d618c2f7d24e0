//! Handler side of the engine.
//!
//! - [`InterceptController`]: registers routes and runs the request and
//!   response legs of every interception
//! - [`IncomingHttpRequest`] / [`IncomingHttpResponse`]: the mutable views
//!   handed to user handlers
//! - [`ContinuationLatch`]: one-shot guard for continuation frames
//! - [`AliasLedger`]: durable alias entries for later lookup

pub mod alias;
pub mod context;
pub mod controller;
pub mod handler;
#[cfg(test)]
pub(crate) mod harness;
pub mod interception;
pub mod latch;
pub mod request;
pub mod response;

pub use alias::AliasLedger;
pub use context::TestId;
pub use controller::{CommandFailures, InterceptController};
pub use handler::{
    request_handler, response_handler, BoxHandlerFuture, Reply, RequestHandler, ResponseHandler,
    RouteHandler,
};
pub use interception::Interception;
pub use latch::ContinuationLatch;
pub use request::IncomingHttpRequest;
pub use response::IncomingHttpResponse;
