//! Shared test utilities for sessiongate integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, Method, Uri};
use serde_json::{Value, json};
use sessiongate::{
    AuthenticationError, ManualClock, RequestContext, SessionEngine, SessionEngineBuilder,
};

pub const SECRET: &str = "secret key";
pub const PASSPHRASE: &str = "correct-horse";

/// A fixed, whole-second starting instant
pub fn fixed_start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).expect("valid timestamp")
}

/// Path of a PEM file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Contents of a PEM fixture
pub fn fixture_pem(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).expect("fixture readable")
}

/// Accepts `admin`/`admin` and `test`/`test`, returning the user name
pub fn demo_authenticator(credentials: &Value) -> Result<Value, AuthenticationError> {
    let username = credentials["username"].as_str();
    let password = credentials["password"].as_str();
    match (username, password) {
        (Some(user), Some(pass)) if user == pass && (user == "admin" || user == "test") => {
            Ok(json!(user))
        }
        (Some(_), Some(_)) => Err(AuthenticationError::FailedAuthentication),
        _ => Err(AuthenticationError::MissingLoginValues),
    }
}

/// Builder with the shared secret, a 1h timeout, 24h refresh window and a manual clock
pub fn hs256_builder(clock: &ManualClock) -> SessionEngineBuilder {
    SessionEngine::builder()
        .secret(SECRET)
        .timeout(Duration::from_secs(60 * 60))
        .max_refresh(Duration::from_secs(24 * 60 * 60))
        .clock(Arc::new(clock.clone()))
        .authenticator(demo_authenticator)
}

/// Engine plus a handle on its clock
pub async fn hs256_engine() -> (SessionEngine, ManualClock) {
    let clock = ManualClock::new(fixed_start());
    let engine = hs256_builder(&clock).build().await.expect("engine builds");
    (engine, clock)
}

pub fn admin_credentials() -> Value {
    json!({"username": "admin", "password": "admin"})
}

/// Request for `uri` with the given headers
pub fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> RequestContext {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            http::header::HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
    }
    RequestContext::new(method, uri.parse::<Uri>().expect("valid uri"), map)
}

/// GET request carrying `Authorization: Bearer <token>`
pub fn bearer_request(token: &str) -> RequestContext {
    let authorization = format!("Bearer {token}");
    request(Method::GET, "/auth/hello", &[("Authorization", authorization.as_str())])
}

/// POST request carrying a refresh token in the JSON body and, optionally, an access token
pub fn refresh_request(refresh_token: &str, access_token: Option<&str>) -> RequestContext {
    let authorization = access_token.map(|t| format!("Bearer {t}"));
    let mut headers = vec![("Content-Type", "application/json")];
    if let Some(value) = authorization.as_deref() {
        headers.push(("Authorization", value));
    }
    request(Method::POST, "/refresh", &headers).with_json_body(json!({"refresh_token": refresh_token}))
}
