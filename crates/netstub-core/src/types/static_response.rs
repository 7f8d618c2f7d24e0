//! Static response types.
//!
//! A [`StaticResponse`] is what a test author declares. It is validated and
//! converted to a [`BackendStaticResponse`] before crossing the event channel,
//! and the traffic side resolves that into a [`ResolvedStaticResponse`] once any
//! fixture has been loaded.

use crate::error::ProtocolMisuse;
use crate::types::request::{find_header, set_header, Headers, ResponseData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pre-declared response that bypasses the real origin.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaticResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    /// Text body, or any JSON value to be served as `application/json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Fixture reference: `name` or `name,encoding`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_network_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_kbps: Option<f64>,
}

impl StaticResponse {
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(self.headers.get_or_insert_with(Headers::new), name, value);
        self
    }

    pub fn with_fixture(mut self, fixture: impl Into<String>) -> Self {
        self.fixture = Some(fixture.into());
        self
    }

    pub fn network_error() -> Self {
        Self {
            force_network_error: Some(true),
            ..Self::default()
        }
    }

    /// Reject combinations the traffic side cannot honor.
    pub fn validate(&self, context: &str) -> Result<(), ProtocolMisuse> {
        let invalid = |reason: &str| ProtocolMisuse::InvalidStaticResponse {
            context: context.to_owned(),
            reason: reason.to_owned(),
        };

        if self.force_network_error == Some(true)
            && (self.body.is_some()
                || self.fixture.is_some()
                || self.status_code.is_some()
                || self.headers.is_some())
        {
            return Err(invalid(
                "`forceNetworkError`, if passed, must be the only option in the StaticResponse",
            ));
        }

        if self.body.is_some() && self.fixture.is_some() {
            return Err(invalid("`body` and `fixture` cannot both be set"));
        }

        if let Some(status) = self.status_code {
            if !(100..=999).contains(&status) {
                return Err(invalid("`statusCode` must be a number between 100 and 999"));
            }
        }

        Ok(())
    }

    /// Convert to the wire form, flattening structured bodies to JSON text.
    pub fn to_backend(&self) -> BackendStaticResponse {
        let mut headers = self.headers.clone();
        let body = self.body.as_ref().map(|body| match body {
            Value::String(text) => text.clone(),
            other => {
                let headers = headers.get_or_insert_with(Headers::new);
                if find_header(headers, "content-type").is_none() {
                    headers.insert("content-type".to_owned(), "application/json".to_owned());
                }
                other.to_string()
            }
        });

        BackendStaticResponse {
            status_code: self.status_code,
            headers,
            body,
            fixture: self.fixture.as_deref().map(FixtureRef::parse),
            force_network_error: self.force_network_error.unwrap_or(false),
            delay_ms: self.delay_ms,
            throttle_kbps: self.throttle_kbps,
        }
    }
}

/// Parsed fixture reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FixtureRef {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl FixtureRef {
    /// Parse `name` or `name,encoding`.
    pub fn parse(reference: &str) -> Self {
        match reference.split_once(',') {
            Some((path, encoding)) => Self {
                file_path: path.trim().to_owned(),
                encoding: Some(encoding.trim().to_owned()).filter(|e| !e.is_empty()),
            },
            None => Self {
                file_path: reference.trim().to_owned(),
                encoding: None,
            },
        }
    }
}

/// Static response as it crosses the event channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendStaticResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<FixtureRef>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_network_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_kbps: Option<f64>,
}

/// Fully determined response the traffic side can serve without the origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStaticResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_network_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_kbps: Option<f64>,
}

impl ResolvedStaticResponse {
    /// Overlay this response onto a real one; unset parts keep the origin's values.
    pub fn apply_to(&self, response: &mut ResponseData, overrides_status: bool) {
        if overrides_status {
            response.status_code = self.status_code;
        }
        for (name, value) in &self.headers {
            set_header(&mut response.headers, name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            response.body = Some(Value::String(body.clone()));
        }
        if self.delay_ms.is_some() {
            response.delay_ms = self.delay_ms;
        }
        if self.throttle_kbps.is_some() {
            response.throttle_kbps = self.throttle_kbps;
        }
        response.force_network_error |= self.force_network_error;
    }
}

impl From<ResolvedStaticResponse> for ResponseData {
    fn from(resolved: ResolvedStaticResponse) -> Self {
        ResponseData {
            status_code: resolved.status_code,
            status_message: None,
            headers: resolved.headers,
            body: resolved.body.map(Value::String),
            delay_ms: resolved.delay_ms,
            throttle_kbps: resolved.throttle_kbps,
            force_network_error: resolved.force_network_error,
        }
    }
}
