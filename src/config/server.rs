use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// HS256 signing key for session tokens.
    pub jwt_secret: String,
    pub token_lifetime: Duration,
    pub oauth: OAuthConfig,
    pub cookie: CookieConfig,
    pub rate_limit: RateLimitConfig,
    /// Origins allowed to make credentialed cross-origin requests.
    pub allowed_origins: Vec<String>,
    pub max_page_size: u32,
}

/// GitHub OAuth app settings. The endpoint URLs are configurable so a
/// GitHub Enterprise host (or a local stand-in) can be used.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
    /// How long a login attempt's state value stays acceptable.
    pub state_ttl: Duration,
    /// Upper bound on each call to GitHub.
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct CookieConfig {
    pub domain: Option<String>,
    /// Adds `Secure` to cookies and turns on HSTS.
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst: u32,
    /// Most client buckets kept at once; the least recently seen is evicted.
    pub max_clients: usize,
    /// Buckets idle for longer than this are dropped first.
    pub idle_ttl: Duration,
    /// Peers whose `X-Forwarded-For` header is trusted.
    pub trusted_proxies: Vec<IpAddr>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ecoci.db")
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            return Err(Error::Config("JWT secret is required".to_string()));
        }
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            tracing::warn!(
                "JWT secret is shorter than {MIN_SECRET_LEN} bytes; use a longer random value"
            );
        }
        if self.token_lifetime.is_zero() {
            return Err(Error::Config("token lifetime must be positive".to_string()));
        }
        if self.oauth.client_id.is_empty() || self.oauth.client_secret.is_empty() {
            return Err(Error::Config(
                "GitHub client id and client secret are required".to_string(),
            ));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.requests_per_second == 0
                || self.rate_limit.burst == 0
                || self.rate_limit.max_clients == 0)
        {
            return Err(Error::Config(
                "rate limit rps, burst and max clients must be positive".to_string(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(Error::Config("max page size must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            jwt_secret: String::new(),
            token_lifetime: Duration::from_secs(24 * 60 * 60),
            oauth: OAuthConfig::default(),
            cookie: CookieConfig::default(),
            rate_limit: RateLimitConfig::default(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
            max_page_size: 100,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: "http://localhost:8080/auth/github/callback".to_string(),
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            scopes: vec!["user:email".to_string(), "read:user".to_string()],
            state_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100,
            burst: 200,
            max_clients: 10_000,
            idle_ttl: Duration::from_secs(600),
            trusted_proxies: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServerConfig {
        ServerConfig {
            jwt_secret: "x".repeat(32),
            oauth: OAuthConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_secret_rejected() {
        let config = ServerConfig {
            jwt_secret: String::new(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_client_credentials_rejected() {
        let mut config = valid();
        config.oauth.client_secret.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_burst_rejected() {
        let mut config = valid();
        config.rate_limit.burst = 0;
        assert!(config.validate().is_err());

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }
}
