//! YAML/JSON/JSONC parsing shared by the engine config and fixture files.

use crate::config::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Structured document format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Jsonc,
}

impl DocumentFormat {
    /// Format for `path`, or `None` when the extension is not a structured one.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)?;

        match ext.as_str() {
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            "json" => Some(DocumentFormat::Json),
            "jsonc" => Some(DocumentFormat::Jsonc),
            _ => None,
        }
    }

    pub fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T, ConfigError> {
        match self {
            DocumentFormat::Yaml => Ok(serde_yaml::from_str(content)?),
            DocumentFormat::Json => Ok(serde_json::from_str(content)?),
            DocumentFormat::Jsonc => Ok(serde_json::from_str(&strip_json_comments(content))?),
        }
    }
}

/// Remove `//` and `/* */` comments outside of string literals.
pub fn strip_json_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                // keep the newline so line numbers in errors stay right
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    prev = skipped;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Parse `content` according to the extension of `path`.
pub fn parse_document<T: DeserializeOwned>(content: &str, path: &str) -> Result<T, ConfigError> {
    DocumentFormat::from_path(path)
        .ok_or_else(|| ConfigError::UnknownFileType(path.to_owned()))?
        .parse(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::EngineConfig;
    use rstest::rstest;
    use serde_json::{json, Value};

    #[rstest]
    #[case("engine.yaml", Some(DocumentFormat::Yaml))]
    #[case("engine.YML", Some(DocumentFormat::Yaml))]
    #[case("fixtures/users.json", Some(DocumentFormat::Json))]
    #[case("engine.JSONC", Some(DocumentFormat::Jsonc))]
    #[case("logo.png", None)]
    #[case("README", None)]
    #[case("", None)]
    fn test_format_from_path(#[case] path: &str, #[case] expected: Option<DocumentFormat>) {
        assert_eq!(DocumentFormat::from_path(path), expected);
    }

    #[rstest]
    #[case("{\"a\": 1} // trailing", json!({"a": 1}))]
    #[case("{\"a\": /* inline */ 1}", json!({"a": 1}))]
    #[case("// header\n{\"a\": [1, 2]}", json!({"a": [1, 2]}))]
    #[case("{\"url\": \"http://host/a\"}", json!({"url": "http://host/a"}))]
    #[case("{\"glob\": \"/api/*\" /* c */}", json!({"glob": "/api/*"}))]
    #[case("{\"q\": \"say \\\"//hi\\\"\"}", json!({"q": "say \"//hi\""}))]
    fn test_strip_json_comments(#[case] input: &str, #[case] expected: Value) {
        let stripped = strip_json_comments(input);
        let parsed: Value = serde_json::from_str(&stripped).expect("Should be valid JSON");
        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn test_strip_json_comments_keeps_line_count() {
        let input = "{\n// one\n/* two\nthree */\n\"a\": 1\n}";
        assert_eq!(strip_json_comments(input).lines().count(), input.lines().count());
    }

    #[rstest]
    #[case(r#"{"defaultCommandTimeoutMs": 100, "fixturesFolder": "stubs"}"#, "engine.json")]
    #[case("{\"defaultCommandTimeoutMs\": 100, // fast\n\"fixturesFolder\": \"stubs\"}", "engine.jsonc")]
    #[case("defaultCommandTimeoutMs: 100\nfixturesFolder: stubs", "engine.yaml")]
    fn test_parse_document_engine_config(#[case] content: &str, #[case] path: &str) {
        let config: EngineConfig = parse_document(content, path).expect("Should parse");
        assert_eq!(config.default_command_timeout_ms, 100);
        assert_eq!(config.fixtures_folder, std::path::PathBuf::from("stubs"));
        assert_eq!(
            config.response_timeout_ms,
            EngineConfig::default().response_timeout_ms
        );
    }

    #[rstest]
    #[case("invalid json", "engine.json")]
    #[case("invalid: yaml: [", "engine.yaml")]
    fn test_parse_document_rejects_malformed(#[case] content: &str, #[case] path: &str) {
        let result: Result<Value, _> = parse_document(content, path);
        assert!(matches!(
            result,
            Err(ConfigError::Json(_)) | Err(ConfigError::Yaml(_))
        ));
    }

    #[rstest]
    fn test_parse_document_unknown_extension() {
        let result: Result<Value, _> = parse_document("{}", "engine.toml");
        assert!(matches!(result, Err(ConfigError::UnknownFileType(p)) if p == "engine.toml"));
    }
}
