//! Registered route and its inspection snapshot.

use crate::matching::{route_matches, MatchableRequest};
use crate::types::matcher::RouteMatcher;
use crate::types::static_response::ResolvedStaticResponse;
use serde::Serialize;

/// A route owned by the registry.
#[derive(Debug, Clone)]
pub struct Route {
    pub handler_id: String,
    pub matcher: RouteMatcher,
    pub static_response: Option<ResolvedStaticResponse>,
    /// A handler function exists on the handler side
    pub has_interceptor: bool,
    hit_count: u64,
    pub disabled: bool,
}

impl Route {
    pub fn new(
        handler_id: impl Into<String>,
        matcher: RouteMatcher,
        static_response: Option<ResolvedStaticResponse>,
        has_interceptor: bool,
    ) -> Self {
        Self {
            handler_id: handler_id.into(),
            matcher,
            static_response,
            has_interceptor,
            hit_count: 0,
            disabled: false,
        }
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn times(&self) -> Option<u32> {
        self.matcher.times
    }

    /// The route has served its `times` cap.
    pub fn is_exhausted(&self) -> bool {
        self.times()
            .is_some_and(|times| self.hit_count >= u64::from(times))
    }

    pub fn is_matchable(&self) -> bool {
        !self.disabled && !self.is_exhausted()
    }

    pub fn matches(&self, request: &MatchableRequest) -> bool {
        self.is_matchable() && route_matches(&self.matcher, request)
    }

    pub(crate) fn record_hit(&mut self) {
        self.hit_count += 1;
    }

    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            handler_id: self.handler_id.clone(),
            hit_count: self.hit_count,
            times: self.times(),
            disabled: self.disabled,
            exhausted: self.is_exhausted(),
            has_interceptor: self.has_interceptor,
            has_static_response: self.static_response.is_some(),
        }
    }
}

/// Route state as exposed to inspection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub handler_id: String,
    pub hit_count: u64,
    pub times: Option<u32>,
    pub disabled: bool,
    pub exhausted: bool,
    pub has_interceptor: bool,
    pub has_static_response: bool,
}
