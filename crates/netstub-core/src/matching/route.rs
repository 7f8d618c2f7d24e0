//! Evaluation of a live route matcher against a request.

use crate::matching::headers::headers_match;
use crate::matching::query::query_matches;
use crate::matching::url::MatchableRequest;
use crate::types::matcher::{RouteMatcher, StringMatcher};

fn field_matches(matcher: Option<&StringMatcher>, value: &str) -> bool {
    matcher.map_or(true, |m| m.matches(value))
}

fn url_matches(matcher: &RouteMatcher, request: &MatchableRequest) -> bool {
    let Some(url) = &matcher.url else {
        return true;
    };
    if url.matches(&request.url) {
        return true;
    }
    matcher.match_url_against_path == Some(true) && url.matches(&request.path)
}

fn method_matches(matcher: Option<&StringMatcher>, method: &str) -> bool {
    let Some(matcher) = matcher else {
        return true;
    };
    matcher.matches(method) || matcher.matches(&method.to_ascii_uppercase())
}

/// Whether every field set on `matcher` accepts `request`.
pub fn route_matches(matcher: &RouteMatcher, request: &MatchableRequest) -> bool {
    if let Some(https) = matcher.https {
        if https != request.https {
            return false;
        }
    }

    if let Some(port) = &matcher.port {
        if !request.port.is_some_and(|p| port.matches(p)) {
            return false;
        }
    }

    if let Some(auth) = &matcher.auth {
        let Some((username, password)) = &request.auth else {
            return false;
        };
        if !auth.username.matches(username) || !auth.password.matches(password) {
            return false;
        }
    }

    method_matches(matcher.method.as_ref(), &request.method)
        && url_matches(matcher, request)
        && field_matches(matcher.hostname.as_ref(), &request.hostname)
        && field_matches(matcher.path.as_ref(), &request.path)
        && field_matches(matcher.pathname.as_ref(), &request.pathname)
        && headers_match(matcher.headers.as_ref(), &request.headers)
        && query_matches(matcher.query.as_ref(), &request.query)
}
