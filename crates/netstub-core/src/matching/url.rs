//! Decomposition of a request into the fields route matchers look at.

use crate::matching::query::parse_query_string;
use crate::types::request::{find_header, RequestData};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Request fields addressable by a route matcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchableRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub https: bool,
    pub hostname: String,
    pub port: Option<u16>,
    /// Path plus query string
    pub path: String,
    pub pathname: String,
    pub query: HashMap<String, String>,
    pub auth: Option<(String, String)>,
}

impl MatchableRequest {
    pub fn from_request(request: &RequestData) -> Self {
        let mut matchable = Self {
            url: request.url.clone(),
            method: request.method.clone(),
            headers: request.headers.clone(),
            auth: find_header(&request.headers, "authorization").and_then(parse_basic_auth),
            ..Self::default()
        };

        match Url::parse(&request.url) {
            Ok(parsed) => {
                matchable.https = parsed.scheme() == "https";
                matchable.hostname = parsed.host_str().unwrap_or_default().to_owned();
                matchable.port = parsed.port_or_known_default();
                matchable.pathname = parsed.path().to_owned();
                matchable.path = match parsed.query() {
                    Some(query) => format!("{}?{}", parsed.path(), query),
                    None => parsed.path().to_owned(),
                };
                matchable.query = parse_query_string(parsed.query().unwrap_or(""));
            }
            Err(_) => {
                // relative URL: everything we have is the path
                let (pathname, query) = request
                    .url
                    .split_once('?')
                    .unwrap_or((request.url.as_str(), ""));
                matchable.path = request.url.clone();
                matchable.pathname = pathname.to_owned();
                matchable.query = parse_query_string(query);
            }
        }

        matchable
    }
}

fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com/api/users?page=1", true, "example.com", Some(443), "/api/users?page=1", "/api/users")]
    #[case("http://localhost:3000/", false, "localhost", Some(3000), "/", "/")]
    #[case("http://localhost/a/b", false, "localhost", Some(80), "/a/b", "/a/b")]
    #[case("/relative/path?x=1", false, "", None, "/relative/path?x=1", "/relative/path")]
    fn test_from_request(
        #[case] url: &str,
        #[case] https: bool,
        #[case] hostname: &str,
        #[case] port: Option<u16>,
        #[case] path: &str,
        #[case] pathname: &str,
    ) {
        let matchable = MatchableRequest::from_request(&RequestData::new("GET", url));
        assert_eq!(matchable.https, https);
        assert_eq!(matchable.hostname, hostname);
        assert_eq!(matchable.port, port);
        assert_eq!(matchable.path, path);
        assert_eq!(matchable.pathname, pathname);
    }

    #[rstest]
    #[case("Basic dXNlcjpwYXNz", Some(("user", "pass")))]
    #[case("basic dXNlcjpwYXNz", Some(("user", "pass")))]
    #[case("Bearer dXNlcjpwYXNz", None)]
    #[case("Basic !!!", None)]
    fn test_parse_basic_auth(#[case] header: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = parse_basic_auth(header);
        assert_eq!(
            parsed.as_ref().map(|(u, p)| (u.as_str(), p.as_str())),
            expected
        );
    }

    #[rstest]
    fn test_query_parsed_from_url() {
        let matchable =
            MatchableRequest::from_request(&RequestData::new("GET", "http://h/p?tag=a&tag=b"));
        assert_eq!(matchable.query.get("tag").map(String::as_str), Some("a,b"));
    }
}
