//! Request and response payloads exchanged over the event channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Header map. Keys are compared case-insensitively by the matchers.
pub type Headers = BTreeMap<String, String>;

/// HTTP request as seen by the traffic side and the request handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    /// Raw text body, or a JSON value once parsed for the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_redirect: Option<bool>,
    /// Milliseconds the traffic side waits for the origin response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_timeout: Option<u64>,
}

impl RequestData {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Value::String(body.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// HTTP response as delivered by the origin and seen by the response handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle_kbps: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_network_error: bool,
}

impl ResponseData {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Value::String(body.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Set `name`, replacing any header that differs from it only in case.
pub fn set_header(headers: &mut Headers, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
    headers.insert(name, value.into());
}

fn is_json_content_type(headers: &Headers) -> bool {
    find_header(headers, "content-type").is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("application/json") || ct.contains("+json")
    })
}

/// Replace a JSON text body with its parsed value when the content type says JSON.
///
/// Bodies that fail to parse are left as text.
pub fn parse_json_body(headers: &Headers, body: &mut Option<Value>) {
    if !is_json_content_type(headers) {
        return;
    }
    if let Some(Value::String(text)) = body {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            *body = Some(parsed);
        }
    }
}

/// Flatten a structured body to its wire text form.
pub fn flatten_body(body: &mut Option<Value>) {
    if let Some(value) = body {
        if !value.is_string() && !value.is_null() {
            *body = Some(Value::String(value.to_string()));
        }
    }
}
