//! Handler function types and the argument of `reply`.

use crate::driver::request::IncomingHttpRequest;
use crate::driver::response::IncomingHttpResponse;
use crate::types::request::Headers;
use crate::types::static_response::StaticResponse;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxHandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Request handler. Returning an error fails the current test step.
pub type RequestHandler = Arc<dyn Fn(IncomingHttpRequest) -> BoxHandlerFuture + Send + Sync>;

/// Response handler installed with `reply` or `on`.
pub type ResponseHandler = Arc<dyn Fn(IncomingHttpResponse) -> BoxHandlerFuture + Send + Sync>;

pub fn request_handler<F, Fut>(f: F) -> RequestHandler
where
    F: Fn(IncomingHttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

pub fn response_handler<F, Fut>(f: F) -> ResponseHandler
where
    F: Fn(IncomingHttpResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |res| Box::pin(f(res)))
}

/// What a route does with matching requests.
#[derive(Clone)]
pub enum RouteHandler {
    Function(RequestHandler),
    StaticResponse(StaticResponse),
    /// Observe matching requests without changing them
    None,
}

/// Argument of [`IncomingHttpRequest::reply`].
#[derive(Clone)]
pub enum Reply {
    /// Send the request on as it is now
    Continue,
    /// Send the request on and run `handler` on the real response
    Handler(ResponseHandler),
    Static(StaticResponse),
    /// Shorthand for a static response with a status code
    Status {
        status_code: u16,
        body: Option<Value>,
        headers: Option<Headers>,
    },
    /// Shorthand for a static response with a body
    Body {
        body: Value,
        headers: Option<Headers>,
    },
}

impl Reply {
    /// Expand the shorthands. `None` for the non-static variants.
    pub fn into_static_response(self) -> Option<StaticResponse> {
        match self {
            Reply::Continue | Reply::Handler(_) => None,
            Reply::Static(response) => Some(response),
            Reply::Status {
                status_code,
                body,
                headers,
            } => Some(StaticResponse {
                status_code: Some(status_code),
                body,
                headers,
                ..StaticResponse::default()
            }),
            Reply::Body { body, headers } => Some(StaticResponse {
                body: Some(body),
                headers,
                ..StaticResponse::default()
            }),
        }
    }
}
