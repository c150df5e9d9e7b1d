//! GitHub OAuth: authorization URL, code exchange, profile fetch.
//!
//! Every failure talking to GitHub is folded into an [`AuthFailure`] so the
//! HTTP layer can answer with a stable error code. The upstream detail only
//! goes to the log.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use reqwest::{Client, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;

use crate::config::OAuthConfig;
use crate::error::{AuthFailure, Error, Result};
use crate::types::ProviderProfile;

const STATE_BYTES: usize = 32;
const USER_AGENT: &str = concat!("ecoci/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";

/// Everything the login route needs to send the browser to GitHub.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub authorization_url: String,
    /// Must be stored for this browser and handed back to `complete_login`.
    pub state: String,
    /// Where to send the browser once the session is established.
    pub return_to: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GitHubOAuth {
    config: OAuthConfig,
    http: Client,
}

impl GitHubOAuth {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        Url::parse(&config.authorize_url)
            .map_err(|e| Error::Config(format!("invalid GitHub authorize URL: {e}")))?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Starts a login attempt with a fresh state value.
    pub fn begin_login(&self, redirect_hint: Option<&str>) -> Result<LoginRequest> {
        let state = generate_state(Utc::now().timestamp());

        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| Error::Config(format!("invalid GitHub authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", &state);

        Ok(LoginRequest {
            authorization_url: url.into(),
            state,
            return_to: sanitize_return_to(redirect_hint),
        })
    }

    /// Finishes a login attempt. The state is checked before GitHub is contacted.
    pub async fn complete_login(
        &self,
        code: &str,
        returned_state: &str,
        expected_state: Option<&str>,
    ) -> Result<ProviderProfile> {
        self.verify_state(returned_state, expected_state)?;

        let access_token = self.exchange_code(code).await?;
        self.fetch_profile(&access_token).await
    }

    /// Checks the returned state against the one issued to this browser.
    pub fn verify_state(&self, returned: &str, expected: Option<&str>) -> Result<()> {
        let expected = expected.ok_or(AuthFailure::StateMismatch)?;

        if returned.is_empty() || !bool::from(returned.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(AuthFailure::StateMismatch.into());
        }

        let issued_at = state_issued_at(expected).ok_or(AuthFailure::StateMismatch)?;
        let age = Utc::now().timestamp() - issued_at;
        if age < 0 || age.unsigned_abs() > self.config.state_ttl.as_secs() {
            return Err(AuthFailure::StateMismatch.into());
        }

        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header(header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "code": code,
                "redirect_uri": self.config.redirect_url,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "GitHub token exchange request failed");
                AuthFailure::ExchangeFailed
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "GitHub rejected token exchange");
            return Err(AuthFailure::ExchangeFailed.into());
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Unreadable GitHub token response");
            AuthFailure::ExchangeFailed
        })?;

        // GitHub reports a bad code with 200 and an `error` field.
        match body.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => {
                tracing::warn!(
                    error = body.error.as_deref().unwrap_or("missing access_token"),
                    "GitHub token exchange returned no token"
                );
                Err(AuthFailure::ExchangeFailed.into())
            }
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile> {
        let user: GitHubUser = self.get_json("/user", access_token).await.map_err(|e| {
            tracing::warn!(error = %e, "GitHub profile fetch failed");
            AuthFailure::ProfileFetchFailed
        })?;

        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => Some(email),
            None => self
                .fetch_primary_email(access_token)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, login = %user.login, "GitHub email lookup failed");
                    None
                }),
        };

        Ok(ProviderProfile {
            github_id: user.id,
            handle: user.login,
            email,
            avatar_url: user.avatar_url,
            name: user.name,
        })
    }

    async fn fetch_primary_email(
        &self,
        access_token: &str,
    ) -> std::result::Result<Option<String>, reqwest::Error> {
        let emails: Vec<GitHubEmail> = self.get_json("/user/emails", access_token).await?;

        let chosen = emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified));

        Ok(chosen.map(|e| e.email.clone()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> std::result::Result<T, reqwest::Error> {
        let url = format!("{}{path}", self.config.api_base_url.trim_end_matches('/'));
        self.http
            .get(url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, GITHUB_JSON)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// `<unix seconds>.<random>`; the timestamp bounds how long the state is honoured.
fn generate_state(issued_at: i64) -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{issued_at}.{}", URL_SAFE_NO_PAD.encode(bytes))
}

fn state_issued_at(state: &str) -> Option<i64> {
    let (issued_at, random) = state.split_once('.')?;
    if random.is_empty() {
        return None;
    }
    issued_at.parse().ok()
}

/// Only same-origin relative paths are honoured as post-login destinations.
#[must_use]
pub fn sanitize_return_to(hint: Option<&str>) -> String {
    match hint {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
