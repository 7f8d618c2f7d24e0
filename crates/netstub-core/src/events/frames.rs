//! Net event frames and their `{event, data}` wire envelope.

use crate::error::NetStubError;
use crate::types::interception::Subscription;
use crate::types::matcher::AnnotatedRouteMatcher;
use crate::types::request::{RequestData, ResponseData};
use crate::types::static_response::BackendStaticResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CREATE_ROUTE: &str = "create:route";
pub const SET_ROUTE_DISABLED: &str = "set:route:disabled";
pub const REQUEST_RECEIVED: &str = "request:received";
pub const REQUEST_CONTINUE: &str = "request:continue";
pub const RESPONSE_RECEIVED: &str = "response:received";
pub const RESPONSE_CONTINUE: &str = "response:continue";
pub const SUBSCRIBE: &str = "subscribe";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRouteFrame {
    pub handler_id: String,
    pub route_matcher: AnnotatedRouteMatcher,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_response: Option<BackendStaticResponse>,
    /// A handler function is registered on the handler side
    pub has_interceptor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetRouteDisabledFrame {
    pub handler_id: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestReceivedFrame {
    pub route_handler_id: String,
    pub request_id: String,
    pub data: RequestData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestContinueFrame {
    pub route_handler_id: String,
    pub request_id: String,
    pub data: RequestData,
    pub has_response_handler: bool,
    /// Set when the handler replied with a static response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_response: Option<BackendStaticResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceivedFrame {
    pub route_handler_id: String,
    pub request_id: String,
    pub data: ResponseData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseContinueFrame {
    pub request_id: String,
    pub data: ResponseData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_response: Option<BackendStaticResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeFrame {
    pub route_handler_id: String,
    pub request_id: String,
    pub subscription: Subscription,
}

/// Decoded net event.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    CreateRoute(CreateRouteFrame),
    SetRouteDisabled(SetRouteDisabledFrame),
    RequestReceived(RequestReceivedFrame),
    RequestContinue(RequestContinueFrame),
    ResponseReceived(ResponseReceivedFrame),
    ResponseContinue(ResponseContinueFrame),
    Subscribe(SubscribeFrame),
}

/// Wire envelope: an event name and its plain-data payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawFrame {
    pub event: String,
    pub data: Value,
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, NetStubError> {
    serde_json::from_value(data).map_err(|source| NetStubError::MalformedFrame {
        event: event.to_owned(),
        source,
    })
}

impl NetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NetEvent::CreateRoute(_) => CREATE_ROUTE,
            NetEvent::SetRouteDisabled(_) => SET_ROUTE_DISABLED,
            NetEvent::RequestReceived(_) => REQUEST_RECEIVED,
            NetEvent::RequestContinue(_) => REQUEST_CONTINUE,
            NetEvent::ResponseReceived(_) => RESPONSE_RECEIVED,
            NetEvent::ResponseContinue(_) => RESPONSE_CONTINUE,
            NetEvent::Subscribe(_) => SUBSCRIBE,
        }
    }

    /// Decode a raw frame. Unknown event names are a protocol mismatch.
    pub fn from_raw(raw: RawFrame) -> Result<Self, NetStubError> {
        let RawFrame { event, data } = raw;
        let decoded = match event.as_str() {
            CREATE_ROUTE => NetEvent::CreateRoute(decode(&event, data)?),
            SET_ROUTE_DISABLED => NetEvent::SetRouteDisabled(decode(&event, data)?),
            REQUEST_RECEIVED => NetEvent::RequestReceived(decode(&event, data)?),
            REQUEST_CONTINUE => NetEvent::RequestContinue(decode(&event, data)?),
            RESPONSE_RECEIVED => NetEvent::ResponseReceived(decode(&event, data)?),
            RESPONSE_CONTINUE => NetEvent::ResponseContinue(decode(&event, data)?),
            SUBSCRIBE => NetEvent::Subscribe(decode(&event, data)?),
            _ => return Err(NetStubError::UnrecognizedEvent { event }),
        };
        Ok(decoded)
    }

    pub fn to_raw(&self) -> Result<RawFrame, NetStubError> {
        let data = match self {
            NetEvent::CreateRoute(f) => serde_json::to_value(f),
            NetEvent::SetRouteDisabled(f) => serde_json::to_value(f),
            NetEvent::RequestReceived(f) => serde_json::to_value(f),
            NetEvent::RequestContinue(f) => serde_json::to_value(f),
            NetEvent::ResponseReceived(f) => serde_json::to_value(f),
            NetEvent::ResponseContinue(f) => serde_json::to_value(f),
            NetEvent::Subscribe(f) => serde_json::to_value(f),
        }
        .map_err(|source| NetStubError::MalformedFrame {
            event: self.name().to_owned(),
            source,
        })?;

        Ok(RawFrame {
            event: self.name().to_owned(),
            data,
        })
    }
}
