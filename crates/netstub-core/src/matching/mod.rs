//! Request matching utilities.

mod headers;
mod query;
mod route;
mod url;

pub use headers::headers_match;
pub use query::{parse_query_string, query_matches};
pub use route::route_matches;
pub use url::MatchableRequest;
