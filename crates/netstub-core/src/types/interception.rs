//! Interception state machine and subscription records.

use crate::types::request::{RequestData, ResponseData};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one interception.
///
/// Non-terminal states advance in declaration order. `Complete` and `Errored`
/// are terminal; `Errored` can be entered from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterceptionState {
    Received,
    Intercepted,
    ResponseReceived,
    ResponseIntercepted,
    Complete,
    Errored,
}

impl InterceptionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InterceptionState::Complete | InterceptionState::Errored)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_advance_to(self, next: InterceptionState) -> bool {
        !self.is_terminal() && next > self
    }
}

/// Event a subscription listens for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubscriptionEvent {
    #[serde(rename = "response")]
    Response,
}

/// A registered future-event hook tied to one interception.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub route_handler_id: String,
    pub event_name: SubscriptionEvent,
    /// The traffic side must hold the wire until the handler side continues
    #[serde(rename = "await")]
    pub await_continue: bool,
}

/// Read-only copy of an interception record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterceptionSnapshot {
    pub id: String,
    pub route_handler_id: String,
    pub request: RequestData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseData>,
    pub state: InterceptionState,
    pub request_waited: bool,
    pub response_waited: bool,
    pub subscriptions: Vec<Subscription>,
    pub has_response_handler: bool,
}
