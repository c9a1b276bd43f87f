//! Locating the raw token in a request
//!
//! A [`TokenLookup`] is an ordered list of `source:name` rules such as
//! `"header:Authorization, query:token, cookie:jwt"`. Sources are tried in
//! order and the first non-empty token wins; when every source fails the error
//! from the last one is returned.
//!
//! [`RequestContext`] is the framework-neutral view of a request the rules run
//! against. Routing glue fills in path parameters; bodies are parsed from
//! `application/x-www-form-urlencoded` or `application/json`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractError;

/// Default lookup for access tokens
pub const DEFAULT_TOKEN_LOOKUP: &str = "header:Authorization";

/// Where to look for a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// `header:<name>`, value must be `<HeadName> <token>`
    Header(String),
    /// `query:<name>`
    Query(String),
    /// `cookie:<name>`
    Cookie(String),
    /// `param:<name>`, a path parameter
    Param(String),
    /// `form:<name>`, a urlencoded body field
    Form(String),
    /// `json:<name>`, a top-level string field of a JSON body
    Json(String),
}

impl TokenSource {
    /// Try this source against `request`
    ///
    /// # Errors
    ///
    /// The source-specific empty-value error, or
    /// [`ExtractError::InvalidAuthHeader`] for a header without the prefix.
    pub fn extract(&self, request: &RequestContext, head_name: &str) -> Result<String, ExtractError> {
        match self {
            TokenSource::Header(name) => {
                let value = request
                    .header(name)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .ok_or(ExtractError::EmptyAuthHeader)?;
                match value.split_once(' ') {
                    Some((prefix, token))
                        if prefix == head_name && !token.is_empty() && !token.starts_with(' ') =>
                    {
                        Ok(token.to_string())
                    }
                    _ => Err(ExtractError::InvalidAuthHeader),
                }
            }
            TokenSource::Query(name) => non_empty(request.query_param(name), ExtractError::EmptyQueryToken),
            TokenSource::Cookie(name) => non_empty(request.cookie(name), ExtractError::EmptyCookieToken),
            TokenSource::Param(name) => non_empty(
                request.path_param(name).map(str::to_string),
                ExtractError::EmptyParamToken,
            ),
            TokenSource::Form(name) => non_empty(
                request.form_value(name).map(str::to_string),
                ExtractError::EmptyParamToken,
            ),
            TokenSource::Json(name) => non_empty(request.json_field(name), ExtractError::EmptyBodyToken),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TokenSource::Header(_) => "header",
            TokenSource::Query(_) => "query",
            TokenSource::Cookie(_) => "cookie",
            TokenSource::Param(_) => "param",
            TokenSource::Form(_) => "form",
            TokenSource::Json(_) => "json",
        }
    }

    fn name(&self) -> &str {
        match self {
            TokenSource::Header(n)
            | TokenSource::Query(n)
            | TokenSource::Cookie(n)
            | TokenSource::Param(n)
            | TokenSource::Form(n)
            | TokenSource::Json(n) => n,
        }
    }
}

fn non_empty(value: Option<String>, error: ExtractError) -> Result<String, ExtractError> {
    value.filter(|v| !v.is_empty()).ok_or(error)
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.name())
    }
}

impl FromStr for TokenSource {
    type Err = ExtractError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let invalid = || ExtractError::InvalidLookup(rule.trim().to_string());
        let (kind, name) = rule.split_once(':').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }
        let name = name.to_string();

        match kind.trim() {
            "header" => Ok(TokenSource::Header(name)),
            "query" => Ok(TokenSource::Query(name)),
            "cookie" => Ok(TokenSource::Cookie(name)),
            "param" => Ok(TokenSource::Param(name)),
            "form" => Ok(TokenSource::Form(name)),
            "json" => Ok(TokenSource::Json(name)),
            _ => Err(invalid()),
        }
    }
}

/// Ordered token sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenLookup {
    sources: Vec<TokenSource>,
}

impl TokenLookup {
    /// Lookup over explicit sources
    pub fn new(sources: Vec<TokenSource>) -> Self {
        Self { sources }
    }

    /// Parse a comma-separated rule list
    ///
    /// # Errors
    ///
    /// [`ExtractError::InvalidLookup`] naming the first bad rule.
    pub fn parse(rules: &str) -> Result<Self, ExtractError> {
        rules.parse()
    }

    /// Configured sources, in priority order
    pub fn sources(&self) -> &[TokenSource] {
        &self.sources
    }

    /// First non-empty token across the sources
    ///
    /// # Errors
    ///
    /// The last source's error when none yields a token, or
    /// [`ExtractError::NoTokenSources`] for an empty lookup.
    pub fn extract(&self, request: &RequestContext, head_name: &str) -> Result<String, ExtractError> {
        let mut last_error = ExtractError::NoTokenSources;
        for source in &self.sources {
            match source.extract(request, head_name) {
                Ok(token) => return Ok(token),
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }
}

impl Default for TokenLookup {
    fn default() -> Self {
        Self {
            sources: vec![TokenSource::Header("Authorization".to_string())],
        }
    }
}

impl FromStr for TokenLookup {
    type Err = ExtractError;

    fn from_str(rules: &str) -> Result<Self, Self::Err> {
        let sources = rules
            .split(',')
            .filter(|rule| !rule.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sources })
    }
}

impl fmt::Display for TokenLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{source}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TokenLookup {
    type Error = ExtractError;

    fn try_from(rules: String) -> Result<Self, Self::Error> {
        rules.parse()
    }
}

impl From<TokenLookup> for String {
    fn from(lookup: TokenLookup) -> Self {
        lookup.to_string()
    }
}

/// The parts of a request token extraction needs
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path_params: HashMap<String, String>,
    form: Vec<(String, String)>,
    json_body: Option<Value>,
}

impl RequestContext {
    /// Context from method, URI and headers, without a body
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
            ..Self::default()
        }
    }

    /// Context from request parts, without a body
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
    }

    /// Context from a full request, parsing the body by content type
    pub fn from_request<B: AsRef<[u8]>>(request: &http::Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
        .with_body(request.body().as_ref())
    }

    /// Attach a body, parsed according to the `Content-Type` header
    ///
    /// Bodies of other types, or that fail to parse, are ignored.
    pub fn with_body(mut self, body: &[u8]) -> Self {
        let content_type = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .unwrap_or_default();

        match content_type.as_str() {
            "application/x-www-form-urlencoded" => {
                self.form = url::form_urlencoded::parse(body).into_owned().collect();
            }
            "application/json" => {
                self.json_body = serde_json::from_slice(body).ok();
            }
            _ => {}
        }
        self
    }

    /// Attach a parsed JSON body
    pub fn with_json_body(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    /// Attach one path parameter
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Attach path parameters captured by the router
    pub fn with_path_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.path_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query parameter, percent-decoded
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Value of a cookie across all `Cookie` headers
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
    }

    /// A path parameter
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// First value of a urlencoded form field
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// A top-level string field of the JSON body
    pub fn json_field(&self, name: &str) -> Option<String> {
        self.json_body
            .as_ref()?
            .get(name)?
            .as_str()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn get(uri: &str) -> http::request::Builder {
        http::Request::builder().method(Method::GET).uri(uri)
    }

    fn context(builder: http::request::Builder) -> RequestContext {
        RequestContext::from_request(&builder.body(Vec::new()).unwrap())
    }

    #[test]
    fn test_parse_lookup_rules() {
        let lookup = TokenLookup::parse(" header: Authorization, query:token ,cookie:jwt,").unwrap();
        assert_eq!(
            lookup.sources(),
            &[
                TokenSource::Header("Authorization".to_string()),
                TokenSource::Query("token".to_string()),
                TokenSource::Cookie("jwt".to_string()),
            ]
        );
        assert_eq!(lookup.to_string(), "header:Authorization, query:token, cookie:jwt");
    }

    #[test]
    fn test_parse_rejects_bad_rules() {
        assert_eq!(
            TokenLookup::parse("header"),
            Err(ExtractError::InvalidLookup("header".to_string()))
        );
        assert_eq!(
            TokenLookup::parse("query:token, smoke:signal"),
            Err(ExtractError::InvalidLookup("smoke:signal".to_string()))
        );
        assert!(TokenLookup::parse("cookie:").is_err());
    }

    #[test]
    fn test_header_requires_exact_prefix() {
        let lookup = TokenLookup::default();
        let ok = context(get("/").header("Authorization", "Bearer abc.def.ghi"));
        assert_eq!(lookup.extract(&ok, "Bearer").unwrap(), "abc.def.ghi");

        for bad in ["Token abc", "Bearerabc", "Bearer  abc", "Bearer", "abc"] {
            let request = context(get("/").header("Authorization", bad));
            assert_eq!(
                lookup.extract(&request, "Bearer"),
                Err(ExtractError::InvalidAuthHeader),
                "header value {bad:?}"
            );
        }

        let missing = context(get("/"));
        assert_eq!(lookup.extract(&missing, "Bearer"), Err(ExtractError::EmptyAuthHeader));
    }

    #[test]
    fn test_later_source_recovers_from_earlier_failure() {
        let lookup = TokenLookup::parse("header:Authorization, query:token").unwrap();

        let query_only = context(get("/?token=from-query"));
        assert_eq!(lookup.extract(&query_only, "Bearer").unwrap(), "from-query");

        let bad_header = context(get("/?token=from-query").header("Authorization", "Basic xyz"));
        assert_eq!(lookup.extract(&bad_header, "Bearer").unwrap(), "from-query");

        let neither = context(get("/?other=1"));
        assert_eq!(lookup.extract(&neither, "Bearer"), Err(ExtractError::EmptyQueryToken));
    }

    #[test]
    fn test_cookie_param_and_form_sources() {
        let cookie = context(get("/").header(COOKIE, "theme=dark; jwt=cookie-token"));
        assert_eq!(
            TokenLookup::parse("cookie:jwt").unwrap().extract(&cookie, "Bearer").unwrap(),
            "cookie-token"
        );
        assert_eq!(
            TokenLookup::parse("cookie:missing").unwrap().extract(&cookie, "Bearer"),
            Err(ExtractError::EmptyCookieToken)
        );

        let param = RequestContext::default().with_path_param("token", "path-token");
        assert_eq!(
            TokenLookup::parse("param:token").unwrap().extract(&param, "Bearer").unwrap(),
            "path-token"
        );

        let form = RequestContext::from_request(
            &http::Request::builder()
                .method(Method::POST)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
                .body(b"token=form%2Dtoken&x=1".to_vec())
                .unwrap(),
        );
        assert_eq!(
            TokenLookup::parse("form:token").unwrap().extract(&form, "Bearer").unwrap(),
            "form-token"
        );
        assert_eq!(
            TokenLookup::parse("form:absent").unwrap().extract(&form, "Bearer"),
            Err(ExtractError::EmptyParamToken)
        );
    }

    #[test]
    fn test_json_body_source() {
        let request = RequestContext::from_request(
            &http::Request::builder()
                .method(Method::POST)
                .header(CONTENT_TYPE, "application/json")
                .body(br#"{"refresh_token":"rt-123","n":5}"#.to_vec())
                .unwrap(),
        );
        assert_eq!(request.json_field("refresh_token").as_deref(), Some("rt-123"));
        assert_eq!(request.json_field("n"), None);
        assert_eq!(
            TokenLookup::parse("json:missing").unwrap().extract(&request, "Bearer"),
            Err(ExtractError::EmptyBodyToken)
        );
    }

    #[test]
    fn test_empty_lookup_reports_no_sources() {
        let lookup = TokenLookup::new(Vec::new());
        assert_eq!(
            lookup.extract(&RequestContext::default(), "Bearer"),
            Err(ExtractError::NoTokenSources)
        );
    }

    #[test]
    fn test_lookup_serde_as_string() {
        let lookup: TokenLookup = serde_json::from_str(r#""query:t, header:X-Auth""#).unwrap();
        assert_eq!(lookup.sources().len(), 2);
        assert_eq!(serde_json::to_string(&lookup).unwrap(), r#""query:t, header:X-Auth""#);
        assert!(serde_json::from_str::<TokenLookup>(r#""nope""#).is_err());
    }

    proptest! {
        #[test]
        fn prop_lookup_display_reparses(
            rules in prop::collection::vec(
                (prop::sample::select(vec!["header", "query", "cookie", "param", "form", "json"]), "[A-Za-z][A-Za-z0-9_-]{0,12}"),
                1..6,
            )
        ) {
            let text = rules
                .iter()
                .map(|(kind, name)| format!("{kind}:{name}"))
                .collect::<Vec<_>>()
                .join(",");
            let lookup = TokenLookup::parse(&text).unwrap();
            prop_assert_eq!(lookup.sources().len(), rules.len());
            prop_assert_eq!(TokenLookup::parse(&lookup.to_string()).unwrap(), lookup);
        }

        #[test]
        fn prop_header_token_roundtrip(token in "[A-Za-z0-9._-]{1,64}") {
            let request = context(get("/").header("Authorization", format!("Bearer {token}")));
            prop_assert_eq!(TokenLookup::default().extract(&request, "Bearer").unwrap(), token);
        }
    }
}
