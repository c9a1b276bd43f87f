//! Cookie delivery of access and refresh tokens
//!
//! The engine never touches a response. It hands back [`SetCookie`] values the
//! caller renders into `Set-Cookie` headers.

use std::fmt;
use std::time::Duration;

use http::HeaderValue;
use http::header::InvalidHeaderValue;
use serde::{Deserialize, Serialize};

/// Default access token cookie name
pub const DEFAULT_COOKIE_NAME: &str = "jwt";

/// Default refresh token cookie name
pub const DEFAULT_REFRESH_COOKIE_NAME: &str = "refresh_token";

/// `SameSite` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Same-site requests only
    Strict,
    /// Same-site requests and top-level navigations
    Lax,
    /// All requests (requires `Secure`)
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

/// Cookie delivery settings
///
/// Access and refresh cookies are configured independently. The refresh
/// cookie is always marked `Secure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Emit cookies on login, refresh and logout
    #[serde(default)]
    pub send_cookie: bool,

    /// Access token cookie name
    #[serde(default = "default_cookie_name")]
    pub name: String,

    /// Access token cookie lifetime; defaults to the access token timeout
    #[serde(default, with = "optional_duration_secs", skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,

    /// Domain for both cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Mark the access token cookie `Secure`
    #[serde(default)]
    pub secure: bool,

    /// Mark the access token cookie `HttpOnly`
    #[serde(default)]
    pub http_only: bool,

    /// `SameSite` for both cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,

    /// Refresh token cookie name
    #[serde(default = "default_refresh_cookie_name")]
    pub refresh_name: String,

    /// Refresh token cookie lifetime; defaults to the refresh token TTL
    #[serde(default, with = "optional_duration_secs", skip_serializing_if = "Option::is_none")]
    pub refresh_max_age: Option<Duration>,

    /// Mark the refresh token cookie `HttpOnly`
    #[serde(default = "default_true")]
    pub refresh_http_only: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            send_cookie: false,
            name: default_cookie_name(),
            max_age: None,
            domain: None,
            secure: false,
            http_only: false,
            same_site: None,
            refresh_name: default_refresh_cookie_name(),
            refresh_max_age: None,
            refresh_http_only: true,
        }
    }
}

impl CookieConfig {
    /// Cookie carrying an access token
    pub fn access_cookie(&self, token: &str, default_max_age: Duration) -> SetCookie {
        SetCookie {
            name: self.name.clone(),
            value: token.to_string(),
            domain: self.domain.clone(),
            max_age: self.max_age.unwrap_or(default_max_age).as_secs(),
            http_only: self.http_only,
            secure: self.secure,
            same_site: self.same_site,
        }
    }

    /// Cookie carrying a refresh token
    pub fn refresh_cookie(&self, token: &str, default_max_age: Duration) -> SetCookie {
        SetCookie {
            name: self.refresh_name.clone(),
            value: token.to_string(),
            domain: self.domain.clone(),
            max_age: self.refresh_max_age.unwrap_or(default_max_age).as_secs(),
            http_only: self.refresh_http_only,
            secure: true,
            same_site: self.same_site,
        }
    }

    /// Expired, empty cookies replacing both tokens
    pub fn clearing_cookies(&self) -> Vec<SetCookie> {
        vec![
            self.access_cookie("", Duration::ZERO).expired(),
            self.refresh_cookie("", Duration::ZERO).expired(),
        ]
    }
}

/// One `Set-Cookie` directive, always scoped to `Path=/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// `Domain` attribute
    pub domain: Option<String>,
    /// `Max-Age` in seconds; zero deletes the cookie
    pub max_age: u64,
    /// `HttpOnly` attribute
    pub http_only: bool,
    /// `Secure` attribute
    pub secure: bool,
    /// `SameSite` attribute
    pub same_site: Option<SameSite>,
}

impl SetCookie {
    /// Same cookie, emptied and expiring immediately
    pub fn expired(mut self) -> Self {
        self.value.clear();
        self.max_age = 0;
        self
    }

    /// Whether this directive deletes the cookie
    pub fn is_removal(&self) -> bool {
        self.max_age == 0
    }

    /// Render as a `Set-Cookie` header value
    ///
    /// # Errors
    ///
    /// Fails if the name, value or domain contain bytes not allowed in headers.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path=/", self.name, self.value)?;
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            write!(f, "; Domain={domain}")?;
        }
        write!(f, "; Max-Age={}", self.max_age)?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={same_site}")?;
        }
        Ok(())
    }
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_refresh_cookie_name() -> String {
    DEFAULT_REFRESH_COOKIE_NAME.to_string()
}

fn default_true() -> bool {
    true
}

mod optional_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn with_domain() -> CookieConfig {
        CookieConfig {
            send_cookie: true,
            domain: Some("example.com".to_string()),
            ..CookieConfig::default()
        }
    }

    #[test]
    fn test_access_cookie_format() {
        let cookie = with_domain().access_cookie("tok", Duration::from_secs(3600));
        assert_eq!(
            cookie.to_string(),
            "jwt=tok; Path=/; Domain=example.com; Max-Age=3600"
        );
    }

    #[test]
    fn test_refresh_cookie_always_secure() {
        let config = CookieConfig {
            secure: false,
            ..with_domain()
        };
        let cookie = config.refresh_cookie("rt", Duration::from_secs(86_400));
        assert!(cookie.secure);
        assert_eq!(
            cookie.to_string(),
            "refresh_token=rt; Path=/; Domain=example.com; Max-Age=86400; HttpOnly; Secure"
        );
    }

    #[test]
    fn test_clearing_cookies() {
        let cleared = with_domain().clearing_cookies();
        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().all(SetCookie::is_removal));
        assert_eq!(cleared[0].to_string(), "jwt=; Path=/; Domain=example.com; Max-Age=0");
        assert_eq!(
            cleared[1].to_string(),
            "refresh_token=; Path=/; Domain=example.com; Max-Age=0; HttpOnly; Secure"
        );
    }

    #[test]
    fn test_configured_attributes() {
        let config = CookieConfig {
            max_age: Some(Duration::from_secs(60)),
            secure: true,
            http_only: true,
            same_site: Some(SameSite::Strict),
            ..CookieConfig::default()
        };
        let cookie = config.access_cookie("t", Duration::from_secs(3600));
        assert_eq!(
            cookie.to_string(),
            "jwt=t; Path=/; Max-Age=60; HttpOnly; Secure; SameSite=Strict"
        );
        assert!(cookie.to_header_value().is_ok());
    }
}
