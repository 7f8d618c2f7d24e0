//! Traffic side of the engine.
//!
//! - [`RouteRegistry`]: stores routes, matches observed traffic and resumes
//!   held requests and responses when the handler side continues them
//! - [`Route`]: a registered route with its hit counter and `times` cap

pub mod route;
pub mod store;

pub use route::{Route, RouteSnapshot};
pub use store::{RequestOutcome, RouteRegistry};
