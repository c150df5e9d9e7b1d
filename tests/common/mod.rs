//! In-process test server plus a stand-in for GitHub's OAuth and REST API.
//!
//! The fake GitHub accepts codes of the form `gh-<id>-<login>` and hands the
//! code back as the access token. Logins starting with `noemail` have no
//! public email, so the server has to ask `/user/emails`. The code `bad` is
//! rejected the way GitHub rejects an expired code.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::header::{COOKIE, SET_COOKIE};
use serde_json::{Value, json};
use tempfile::TempDir;

use ecoci::config::{OAuthConfig, ServerConfig};
use ecoci::server::{AppState, create_router};
use ecoci::store::{SqliteStore, Store};

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub struct MockGitHub {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl MockGitHub {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn count_hits(State(hits): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn access_token(Json(body): Json<Value>) -> Json<Value> {
    match body["code"].as_str() {
        Some("bad") | None => Json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        })),
        Some(code) => Json(json!({"access_token": code, "token_type": "bearer"})),
    }
}

/// `gh-<id>-<login>` as issued by [`access_token`].
fn parse_token(headers: &HeaderMap) -> Option<(i64, String)> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    let (id, login) = token.strip_prefix("gh-")?.split_once('-')?;
    Some((id.parse().ok()?, login.to_string()))
}

async fn user(headers: HeaderMap) -> Response {
    let Some((id, login)) = parse_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"}))).into_response();
    };
    let email = if login.starts_with("noemail") {
        Value::Null
    } else {
        json!(format!("{login}@example.com"))
    };
    Json(json!({
        "id": id,
        "login": login,
        "email": email,
        "name": format!("{login} name"),
        "avatar_url": format!("https://avatars.example.com/{id}")
    }))
    .into_response()
}

async fn user_emails(headers: HeaderMap) -> Response {
    let Some((_, login)) = parse_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    Json(json!([
        {"email": format!("{login}@old.example"), "primary": false, "verified": true},
        {"email": format!("{login}@primary.example"), "primary": true, "verified": true}
    ]))
    .into_response()
}

async fn spawn_mock_github() -> MockGitHub {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/login/oauth/authorize", get(|| async { "authorize" }))
        .route("/login/oauth/access_token", post(access_token))
        .route("/user", get(user))
        .route("/user/emails", get(user_emails))
        .layer(middleware::from_fn_with_state(hits.clone(), count_hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock github");
    let addr = listener.local_addr().expect("mock github addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock github");
    });

    MockGitHub {
        base_url: format!("http://{addr}"),
        hits,
    }
}

pub struct TestServer {
    pub base_url: String,
    pub github: MockGitHub,
    pub store: Arc<SqliteStore>,
    pub client: reqwest::Client,
    _temp_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let github = spawn_mock_github().await;

        let mut config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            jwt_secret: JWT_SECRET.to_string(),
            oauth: OAuthConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-client-secret".to_string(),
                authorize_url: format!("{}/login/oauth/authorize", github.base_url),
                token_url: format!("{}/login/oauth/access_token", github.base_url),
                api_base_url: github.base_url.clone(),
                ..Default::default()
            },
            ..Default::default()
        };
        configure(&mut config);

        let store = Arc::new(SqliteStore::new(config.db_path()).expect("open store"));
        store.initialize().expect("initialize store");

        let state = Arc::new(
            AppState::new(store.clone() as Arc<dyn Store>, config).expect("build app state"),
        );
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind server");
        let addr = listener.local_addr().expect("server addr");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("serve");
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("build client");

        Self {
            base_url: format!("http://{addr}"),
            github,
            store,
            client,
            _temp_dir: temp_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Starts a login and returns the state value and the `Location` header.
    pub async fn begin_login(&self, redirect_uri: Option<&str>) -> (String, String) {
        let mut request = self.client.get(self.url("/auth/github"));
        if let Some(uri) = redirect_uri {
            request = request.query(&[("redirect_uri", uri)]);
        }
        let resp = request.send().await.expect("begin login");
        assert_eq!(resp.status(), 302);

        let location = header_str(&resp, "location");
        let state = set_cookies(&resp)
            .remove("oauth_state")
            .expect("oauth_state cookie");
        (state, location)
    }

    /// Runs the callback with a matching state cookie.
    pub async fn callback(&self, code: &str, state: &str) -> reqwest::Response {
        self.client
            .get(self.url("/auth/github/callback"))
            .query(&[("code", code), ("state", state)])
            .header(COOKIE, format!("oauth_state={state}"))
            .send()
            .await
            .expect("callback")
    }

    /// Logs in as a GitHub user and returns the session token.
    pub async fn login(&self, github_id: i64, login: &str) -> String {
        let (state, _) = self.begin_login(None).await;
        let resp = self.callback(&format!("gh-{github_id}-{login}"), &state).await;
        assert_eq!(resp.status(), 302, "login callback failed");
        set_cookies(&resp)
            .remove("ecoci_token")
            .expect("ecoci_token cookie")
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(COOKIE, format!("ecoci_token={token}"))
            .send()
            .await
            .expect("GET")
    }

    pub async fn post_json(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(COOKIE, format!("ecoci_token={token}"))
            .json(body)
            .send()
            .await
            .expect("POST")
    }

    pub async fn put_json(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .header(COOKIE, format!("ecoci_token={token}"))
            .json(body)
            .send()
            .await
            .expect("PUT")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .header(COOKIE, format!("ecoci_token={token}"))
            .send()
            .await
            .expect("DELETE")
    }

    pub async fn submit_run(&self, token: &str, body: &Value) -> Value {
        let resp = self.post_json("/runs", token, body).await;
        assert_eq!(resp.status(), 201, "run submission failed");
        resp.json::<Value>().await.expect("run body")["data"].clone()
    }
}

/// Name to raw value for every `Set-Cookie` header on the response.
pub fn set_cookies(resp: &reqwest::Response) -> HashMap<String, String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Full `Set-Cookie` header for `name`.
pub fn set_cookie_header(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub fn header_str(resp: &reqwest::Response, name: &str) -> String {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// A run submission for `full_name` with the given emissions.
pub fn run_body(full_name: &str, co2_kg: f64) -> Value {
    let name = full_name.rsplit('/').next().unwrap_or(full_name);
    json!({
        "energy_kwh": 0.5,
        "co2_kg": co2_kg,
        "duration_s": 120,
        "repository": {
            "name": name,
            "full_name": full_name,
            "html_url": format!("https://github.com/{full_name}")
        }
    })
}
