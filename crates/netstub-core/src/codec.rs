//! Conversion between annotated (wire) route matchers and live route matchers.
//!
//! Every string-matcher field crosses the channel as `{value, type}`. Decoding
//! looks the `type` up in [`DECODERS`]; add a row there to support a new
//! matcher kind. Fields that need no annotation (`https`, `port`,
//! `matchUrlAgainstPath`, `times`) are copied verbatim.

use crate::error::NetStubError;
use crate::types::matcher::{
    AnnotatedRouteMatcher, AnnotatedStringMatcher, BasicAuth, MatcherOptions, MatcherType,
    RouteMatcher, StringMatcher,
};
use std::collections::BTreeMap;
use std::convert::Infallible;

type Decoder = fn(&str) -> Result<StringMatcher, String>;

/// Reconstruction table keyed by the wire `type` tag.
const DECODERS: &[(MatcherType, Decoder)] = &[
    (MatcherType::Glob, decode_glob),
    (MatcherType::Regex, decode_regex),
];

fn decode_glob(value: &str) -> Result<StringMatcher, String> {
    Ok(StringMatcher::glob(value))
}

/// `/pattern/flags`, split at the last slash.
fn decode_regex(value: &str) -> Result<StringMatcher, String> {
    let last_slash = value.rfind('/').unwrap_or(0);
    if !value.starts_with('/') || last_slash == 0 {
        return Err("expected `/pattern/flags`".to_owned());
    }
    let pattern = &value[1..last_slash];
    let flags = &value[last_slash + 1..];
    StringMatcher::regex(pattern, flags)
}

fn decoder_for(kind: MatcherType) -> Decoder {
    DECODERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, decoder)| *decoder)
        .unwrap_or(decode_glob)
}

fn decode_string_matcher(
    field: &str,
    annotated: &AnnotatedStringMatcher,
) -> Result<StringMatcher, NetStubError> {
    decoder_for(annotated.kind)(&annotated.value).map_err(|reason| NetStubError::InvalidMatcher {
        field: field.to_owned(),
        value: annotated.value.clone(),
        reason,
    })
}

fn encode_string_matcher(
    _field: &str,
    matcher: &StringMatcher,
) -> Result<AnnotatedStringMatcher, Infallible> {
    Ok(match matcher {
        StringMatcher::Glob(glob) => AnnotatedStringMatcher::glob(glob.source()),
        StringMatcher::Regex(regex) => AnnotatedStringMatcher::regex(regex.to_string()),
    })
}

/// Walk every string-matcher field of `options`, converting it with `f` and
/// copying everything else unchanged.
fn map_string_matchers<A, B, E>(
    options: &MatcherOptions<A>,
    f: impl Fn(&str, &A) -> Result<B, E>,
) -> Result<MatcherOptions<B>, E> {
    let one = |field: &str, value: &Option<A>| value.as_ref().map(|v| f(field, v)).transpose();
    let map = |prefix: &str, values: &Option<BTreeMap<String, A>>| {
        values
            .as_ref()
            .map(|values| {
                values
                    .iter()
                    .map(|(key, v)| f(&format!("{prefix}.{key}"), v).map(|m| (key.clone(), m)))
                    .collect::<Result<BTreeMap<_, _>, E>>()
            })
            .transpose()
    };

    let auth = match &options.auth {
        Some(auth) => Some(BasicAuth {
            username: f("auth.username", &auth.username)?,
            password: f("auth.password", &auth.password)?,
        }),
        None => None,
    };

    Ok(MatcherOptions {
        auth,
        headers: map("headers", &options.headers)?,
        hostname: one("hostname", &options.hostname)?,
        method: one("method", &options.method)?,
        path: one("path", &options.path)?,
        pathname: one("pathname", &options.pathname)?,
        query: map("query", &options.query)?,
        url: one("url", &options.url)?,
        https: options.https,
        port: options.port.clone(),
        match_url_against_path: options.match_url_against_path,
        times: options.times,
    })
}

/// Rebuild the live matcher from its annotated wire form.
pub fn decode_matcher(annotated: &AnnotatedRouteMatcher) -> Result<RouteMatcher, NetStubError> {
    map_string_matchers(annotated, decode_string_matcher)
}

/// Annotate a live matcher for the wire.
pub fn encode_matcher(matcher: &RouteMatcher) -> AnnotatedRouteMatcher {
    match map_string_matchers(matcher, encode_string_matcher) {
        Ok(annotated) => annotated,
        Err(never) => match never {},
    }
}
