//! Interception engine for stubbing HTTP traffic of a browser under test.
//!
//! The traffic side ([`registry::RouteRegistry`]) matches real requests against
//! registered routes. The handler side ([`driver::InterceptController`]) runs
//! user handlers for matched requests. The two sides talk only through the
//! event channel in [`events`].

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod matching;
pub mod registry;
pub mod resolver;
pub mod types;

mod sync;

pub use config::{load_config, EngineConfig};
pub use driver::{
    request_handler, response_handler, CommandFailures, IncomingHttpRequest,
    IncomingHttpResponse, InterceptController, Reply, RouteHandler, TestId,
};
pub use error::{NetStubError, ProtocolMisuse, Result};
pub use registry::{RequestOutcome, RouteRegistry};
pub use resolver::{FixtureResolver, StaticResponseResolver};
pub use types::matcher::{RouteMatcher, StringMatcher};
pub use types::request::{RequestData, ResponseData};
pub use types::static_response::StaticResponse;
