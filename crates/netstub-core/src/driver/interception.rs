//! Handler-side interception record.

use crate::driver::handler::ResponseHandler;
use crate::types::interception::{
    InterceptionSnapshot, InterceptionState, Subscription, SubscriptionEvent,
};
use crate::types::request::{RequestData, ResponseData};
use std::sync::{Arc, Mutex};
use tracing::warn;

pub(crate) struct SubscriptionEntry {
    pub subscription: Subscription,
    pub handler: ResponseHandler,
}

/// Live record of one request matched to a route.
pub struct Interception {
    pub(crate) id: String,
    pub(crate) route_handler_id: String,
    pub(crate) request: RequestData,
    pub(crate) response: Option<ResponseData>,
    pub(crate) state: InterceptionState,
    pub(crate) request_waited: bool,
    pub(crate) response_waited: bool,
    pub(crate) subscriptions: Vec<SubscriptionEntry>,
    pub(crate) response_handler: Option<ResponseHandler>,
}

pub type SharedInterception = Arc<Mutex<Interception>>;

impl Interception {
    pub(crate) fn new(
        id: impl Into<String>,
        route_handler_id: impl Into<String>,
        request: RequestData,
    ) -> Self {
        Self {
            id: id.into(),
            route_handler_id: route_handler_id.into(),
            request,
            response: None,
            state: InterceptionState::Received,
            request_waited: false,
            response_waited: false,
            subscriptions: Vec::new(),
            response_handler: None,
        }
    }

    pub fn state(&self) -> InterceptionState {
        self.state
    }

    /// Move to `next` if that keeps the lifecycle monotonic. Terminal
    /// states are kept silently.
    pub(crate) fn advance(&mut self, next: InterceptionState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if !self.state.can_advance_to(next) {
            warn!(
                request_id = %self.id,
                from = ?self.state,
                to = ?next,
                "ignored backward interception state change"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// A response-leg handler will run for this interception.
    pub(crate) fn has_response_handler(&self) -> bool {
        self.response_handler.is_some()
            || self.subscriptions.iter().any(|entry| {
                entry.subscription.event_name == SubscriptionEvent::Response
                    && entry.subscription.await_continue
            })
    }

    pub(crate) fn response_handlers(&self) -> Vec<ResponseHandler> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.subscription.event_name == SubscriptionEvent::Response)
            .map(|entry| Arc::clone(&entry.handler))
            .collect()
    }

    pub fn snapshot(&self) -> InterceptionSnapshot {
        InterceptionSnapshot {
            id: self.id.clone(),
            route_handler_id: self.route_handler_id.clone(),
            request: self.request.clone(),
            response: self.response.clone(),
            state: self.state,
            request_waited: self.request_waited,
            response_waited: self.response_waited,
            subscriptions: self
                .subscriptions
                .iter()
                .map(|entry| entry.subscription.clone())
                .collect(),
            has_response_handler: self.has_response_handler(),
        }
    }
}
