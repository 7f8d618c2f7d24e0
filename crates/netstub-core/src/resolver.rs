//! Static response resolution.
//!
//! The traffic side never serves a [`BackendStaticResponse`] directly: it is
//! first turned into a [`ResolvedStaticResponse`], loading the referenced
//! fixture if there is one. Routes only become matchable once this succeeds.

use crate::config::parser::DocumentFormat;
use crate::config::settings::EngineConfig;
use crate::error::{NetStubError, Result};
use crate::types::request::{find_header, Headers};
use crate::types::static_response::{BackendStaticResponse, FixtureRef, ResolvedStaticResponse};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_STATUS: u16 = 200;

#[async_trait]
pub trait StaticResponseResolver: Send + Sync {
    async fn resolve(&self, response: &BackendStaticResponse) -> Result<ResolvedStaticResponse>;
}

/// Loaded fixture body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub body: String,
    pub content_type: Option<&'static str>,
}

/// Resolves fixtures relative to a fixtures folder.
#[derive(Debug, Clone)]
pub struct FixtureResolver {
    fixtures_folder: PathBuf,
}

impl FixtureResolver {
    pub fn new(fixtures_folder: impl Into<PathBuf>) -> Self {
        Self {
            fixtures_folder: fixtures_folder.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.fixtures_folder.clone())
    }

    pub fn fixtures_folder(&self) -> &Path {
        &self.fixtures_folder
    }

    /// Find the file for `file_path`. A name without an extension falls back
    /// to the first `name.*` match.
    async fn locate(&self, file_path: &str) -> Result<PathBuf> {
        let direct = self.fixtures_folder.join(file_path);
        if tokio::fs::try_exists(&direct).await.unwrap_or(false) {
            return Ok(direct);
        }

        if direct.extension().is_none() {
            let pattern = format!(
                "{}.*",
                glob::Pattern::escape(&direct.to_string_lossy())
            );
            let found = glob::glob(&pattern)
                .map_err(|e| fixture_error(file_path, e.to_string()))?
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file())
                .min();
            if let Some(path) = found {
                return Ok(path);
            }
        }

        Err(fixture_error(
            file_path,
            format!("no such file in {}", self.fixtures_folder.display()),
        ))
    }

    pub async fn load(&self, fixture: &FixtureRef) -> Result<Fixture> {
        let path = self.locate(&fixture.file_path).await?;
        let read_error = |e: std::io::Error| fixture_error(&fixture.file_path, e.to_string());

        match fixture.encoding.as_deref() {
            Some("base64") => {
                let bytes = tokio::fs::read(&path).await.map_err(read_error)?;
                Ok(Fixture {
                    body: STANDARD.encode(bytes),
                    content_type: None,
                })
            }
            None | Some("utf8") | Some("utf-8") => {
                let text = tokio::fs::read_to_string(&path).await.map_err(read_error)?;
                match DocumentFormat::from_path(&path) {
                    Some(format) => {
                        let value: Value = format
                            .parse(&text)
                            .map_err(|e| fixture_error(&fixture.file_path, e.to_string()))?;
                        Ok(Fixture {
                            body: value.to_string(),
                            content_type: Some("application/json"),
                        })
                    }
                    None => Ok(Fixture {
                        body: text,
                        content_type: None,
                    }),
                }
            }
            Some(other) => Err(fixture_error(
                &fixture.file_path,
                format!("unsupported encoding `{other}`"),
            )),
        }
    }
}

fn fixture_error(fixture: &str, reason: String) -> NetStubError {
    NetStubError::FixtureLoad {
        fixture: fixture.to_owned(),
        reason,
    }
}

#[async_trait]
impl StaticResponseResolver for FixtureResolver {
    async fn resolve(&self, response: &BackendStaticResponse) -> Result<ResolvedStaticResponse> {
        let mut headers = response.headers.clone().unwrap_or_default();
        let mut body = response.body.clone();

        if let Some(fixture) = &response.fixture {
            let loaded = self.load(fixture).await?;
            debug!(fixture = %fixture.file_path, bytes = loaded.body.len(), "loaded fixture");
            if let Some(content_type) = loaded.content_type {
                set_default_header(&mut headers, "content-type", content_type);
            }
            body = Some(loaded.body);
        }

        Ok(ResolvedStaticResponse {
            status_code: response.status_code.unwrap_or(DEFAULT_STATUS),
            headers,
            body,
            force_network_error: response.force_network_error,
            delay_ms: response.delay_ms,
            throttle_kbps: response.throttle_kbps,
        })
    }
}

fn set_default_header(headers: &mut Headers, name: &str, value: &str) {
    if find_header(headers, name).is_none() {
        headers.insert(name.to_owned(), value.to_owned());
    }
}
