//! Route matcher types in their live and annotated (wire) forms.

use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind tag carried by every string matcher on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatcherType {
    Glob,
    Regex,
}

/// Wire-safe string matcher: `{value, type}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnotatedStringMatcher {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: MatcherType,
}

impl AnnotatedStringMatcher {
    pub fn glob(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: MatcherType::Glob,
        }
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: MatcherType::Regex,
        }
    }
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// String matched by equality or glob pattern.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    source: String,
    // `None` when the source is not a valid glob; only equality applies then
    pattern: Option<Pattern>,
}

impl GlobMatcher {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let pattern = Pattern::new(&source).ok();
        Self { source, pattern }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Equality, then glob, then glob against the last path segment when the
    /// pattern itself has no separator.
    pub fn matches(&self, value: &str) -> bool {
        if value == self.source {
            return true;
        }
        let Some(pattern) = &self.pattern else {
            return false;
        };
        if pattern.matches_with(value, GLOB_OPTIONS) {
            return true;
        }
        if self.source.contains('/') {
            return false;
        }
        value
            .rsplit('/')
            .next()
            .is_some_and(|base| pattern.matches_with(base, GLOB_OPTIONS))
    }
}

/// Compiled regular expression that remembers its source and flags.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    source: String,
    flags: String,
    regex: Regex,
}

impl RegexMatcher {
    /// Compile `source` with JavaScript-style `flags`.
    ///
    /// `i`, `m` and `s` map onto the equivalent regex options. `g`, `y`, `u`,
    /// `d` and `v` do not change whether a string matches and are kept only so
    /// the matcher can be encoded back unchanged.
    pub fn new(source: &str, flags: &str) -> Result<Self, String> {
        let mut builder = RegexBuilder::new(source);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'g' | 'y' | 'u' | 'd' | 'v' => {}
                other => return Err(format!("unsupported flag `{other}`")),
            }
        }
        let regex = builder.build().map_err(|e| e.to_string())?;
        Ok(Self {
            source: source.to_owned(),
            flags: flags.to_owned(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl fmt::Display for RegexMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// Live string matcher, as built by in-process callers or by the codec.
#[derive(Debug, Clone)]
pub enum StringMatcher {
    Glob(GlobMatcher),
    Regex(RegexMatcher),
}

impl StringMatcher {
    pub fn glob(source: impl Into<String>) -> Self {
        StringMatcher::Glob(GlobMatcher::new(source))
    }

    pub fn regex(source: &str, flags: &str) -> Result<Self, String> {
        RegexMatcher::new(source, flags).map(StringMatcher::Regex)
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            StringMatcher::Glob(glob) => glob.matches(value),
            StringMatcher::Regex(regex) => regex.is_match(value),
        }
    }
}

impl PartialEq for StringMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StringMatcher::Glob(a), StringMatcher::Glob(b)) => a.source == b.source,
            (StringMatcher::Regex(a), StringMatcher::Regex(b)) => {
                a.source == b.source && a.flags == b.flags
            }
            _ => false,
        }
    }
}

impl From<&str> for StringMatcher {
    fn from(value: &str) -> Self {
        StringMatcher::glob(value)
    }
}

/// A single port or a list of accepted ports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortMatcher {
    One(u16),
    Any(Vec<u16>),
}

impl PortMatcher {
    pub fn matches(&self, port: u16) -> bool {
        match self {
            PortMatcher::One(p) => *p == port,
            PortMatcher::Any(ports) => ports.contains(&port),
        }
    }
}

/// Basic-auth credentials matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BasicAuth<S> {
    pub username: S,
    pub password: S,
}

/// Route matcher options, generic over the string matcher representation.
///
/// `S` is [`StringMatcher`] for the live form and [`AnnotatedStringMatcher`]
/// for the form that crosses the event channel. Every other field has the
/// same type in both forms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatcherOptions<S> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<BasicAuth<S>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, S>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathname: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, S>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<PortMatcher>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_url_against_path: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times: Option<u32>,
}

impl<S> Default for MatcherOptions<S> {
    fn default() -> Self {
        Self {
            auth: None,
            headers: None,
            hostname: None,
            method: None,
            path: None,
            pathname: None,
            query: None,
            url: None,
            https: None,
            port: None,
            match_url_against_path: None,
            times: None,
        }
    }
}

/// Live route matcher.
pub type RouteMatcher = MatcherOptions<StringMatcher>;

/// Route matcher as it crosses the event channel.
pub type AnnotatedRouteMatcher = MatcherOptions<AnnotatedStringMatcher>;

impl RouteMatcher {
    /// Matcher for `method` and a URL glob compared against the request path.
    pub fn method_and_path(method: &str, url: &str) -> Self {
        Self {
            method: Some(StringMatcher::glob(method)),
            url: Some(StringMatcher::glob(url)),
            match_url_against_path: Some(true),
            ..Self::default()
        }
    }
}
