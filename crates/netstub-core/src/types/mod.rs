//! Core domain types for matchers, requests, static responses, and interceptions.

pub mod interception;
pub mod matcher;
pub mod request;
pub mod static_response;
