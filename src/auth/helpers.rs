use axum::http::{HeaderMap, HeaderValue, header::COOKIE};

use crate::config::CookieConfig;
use crate::error::{Error, Result};

/// HttpOnly cookie holding the session token.
pub const SESSION_COOKIE: &str = "ecoci_token";
/// Login state issued by `GET /auth/github`, consumed by the callback.
pub const STATE_COOKIE: &str = "oauth_state";
/// Relative path to return to after login.
pub const RETURN_TO_COOKIE: &str = "redirect_after_auth";

/// Returns the value of the first cookie called `name`.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Builds a `Set-Cookie` value. Values are percent-encoded.
pub fn build_cookie(
    name: &str,
    value: &str,
    max_age_secs: i64,
    config: &CookieConfig,
) -> Result<HeaderValue> {
    let mut cookie = format!(
        "{name}={}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax",
        urlencoding::encode(value)
    );
    if let Some(domain) = &config.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if config.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::try_from(cookie)
        .map_err(|_| Error::Config(format!("cookie domain is not a valid header value: {:?}", config.domain)))
}

/// A `Set-Cookie` value that removes the cookie.
pub fn clear_cookie(name: &str, config: &CookieConfig) -> Result<HeaderValue> {
    build_cookie(name, "", 0, config)
}

/// Reads and percent-decodes a cookie written by [`build_cookie`].
pub fn read_encoded_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = read_cookie(headers, name)?;
    urlencoding::decode(&raw).ok().map(|v| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; ecoci_token=abc.def; b=2"));
        headers.append(COOKIE, HeaderValue::from_static("oauth_state=xyz"));

        assert_eq!(read_cookie(&headers, SESSION_COOKIE).as_deref(), Some("abc.def"));
        assert_eq!(read_cookie(&headers, STATE_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("ecoci_token="));
        assert_eq!(read_cookie(&headers, SESSION_COOKIE), None);
    }

    #[test]
    fn test_build_cookie_attributes() {
        let config = CookieConfig {
            domain: Some("example.com".to_string()),
            secure: true,
        };
        let cookie = build_cookie(RETURN_TO_COOKIE, "/repos?page=2", 300, &config).unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with("redirect_after_auth=%2Frepos%3Fpage%3D2;"));
        assert!(cookie.contains("Max-Age=300"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Domain=example.com"));
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn test_encoded_cookie_round_trip() {
        let value = build_cookie(RETURN_TO_COOKIE, "/a b?c=d", 300, &CookieConfig::default()).unwrap();
        let pair = value.to_str().unwrap().split(';').next().unwrap().to_string();

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&pair).unwrap());
        assert_eq!(
            read_encoded_cookie(&headers, RETURN_TO_COOKIE).as_deref(),
            Some("/a b?c=d")
        );
    }
}
