//! Query parameters parsing and matching.

use crate::types::matcher::StringMatcher;
use std::collections::{BTreeMap, HashMap};

/// Parse query string into HashMap with URL decoding.
///
/// Repeated keys are joined with commas.
pub fn parse_query_string(query_str: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();

    if query_str.is_empty() {
        return result;
    }

    for pair in query_str.split('&') {
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);

        if let Some(existing) = result.get_mut(&key) {
            existing.push(',');
            existing.push_str(&value);
        } else {
            result.insert(key, value);
        }
    }

    result
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(raw)
}

/// Every expected parameter must be present and matched by its matcher.
pub fn query_matches(
    expected: Option<&BTreeMap<String, StringMatcher>>,
    actual: &HashMap<String, String>,
) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    expected.iter().all(|(key, matcher)| {
        actual
            .get(key)
            .is_some_and(|value| matcher.matches(value))
    })
}
