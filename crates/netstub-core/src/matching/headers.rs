//! Headers matching (case-insensitive names, string matcher values).

use crate::types::matcher::StringMatcher;
use std::collections::{BTreeMap, HashMap};

fn normalize_headers<'a>(
    headers: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> HashMap<String, &'a str> {
    headers
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect()
}

/// Every expected header must be present and matched by its matcher.
pub fn headers_match(
    expected: Option<&BTreeMap<String, StringMatcher>>,
    actual: &BTreeMap<String, String>,
) -> bool {
    let expected = match expected {
        None => return true,
        Some(e) if e.is_empty() => return true,
        Some(e) => e,
    };

    let actual = normalize_headers(actual);

    expected.iter().all(|(name, matcher)| {
        actual
            .get(&name.to_lowercase())
            .is_some_and(|value| matcher.matches(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn h(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).into(), (*v).into()))
            .collect()
    }

    fn m(pairs: &[(&str, &str)]) -> BTreeMap<String, StringMatcher> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).into(), StringMatcher::glob(*v)))
            .collect()
    }

    #[rstest]
    #[case(&[], None, true)]
    #[case(&[("Content-Type", "application/json")], Some(m(&[])), true)]
    #[case(&[("Content-Type", "application/json"), ("Auth", "Bearer x")], Some(m(&[("content-type", "application/json")])), true)]
    #[case(&[("Content-Type", "application/json")], Some(m(&[("Content-Type", "application/*")])), true)]
    #[case(&[("Content-Type", "application/json")], Some(m(&[("Content-Type", "text/plain")])), false)]
    #[case(&[], Some(m(&[("Content-Type", "application/json")])), false)]
    #[case(&[("Accept", "text/html")], Some(m(&[("Content-Type", "application/json")])), false)]
    fn test_headers_match(
        #[case] actual: &[(&str, &str)],
        #[case] expected: Option<BTreeMap<String, StringMatcher>>,
        #[case] result: bool,
    ) {
        assert_eq!(headers_match(expected.as_ref(), &h(actual)), result);
    }

    #[rstest]
    fn test_headers_match_regex_value() {
        let mut expected = BTreeMap::new();
        expected.insert(
            "authorization".to_string(),
            StringMatcher::regex("^Bearer \\w+$", "").expect("Should compile"),
        );
        assert!(headers_match(
            Some(&expected),
            &h(&[("Authorization", "Bearer abc123")])
        ));
        assert!(!headers_match(
            Some(&expected),
            &h(&[("Authorization", "Basic abc123")])
        ));
    }
}
