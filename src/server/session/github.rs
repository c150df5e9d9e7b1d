use std::sync::Arc;

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::auth::helpers::{
    RETURN_TO_COOKIE, SESSION_COOKIE, STATE_COOKIE, build_cookie, clear_cookie, read_cookie,
    read_encoded_cookie,
};
use crate::auth::oauth::sanitize_return_to;
use crate::error::AuthFailure;
use crate::server::AppState;
use crate::server::dto::{CallbackParams, LoginParams};
use crate::server::response::{ApiError, StoreResultExt};

fn redirect(location: &str, mut headers: HeaderMap) -> Result<Response, ApiError> {
    let location = HeaderValue::from_str(location).map_err(|_| {
        tracing::error!("Redirect target is not a valid header value");
        ApiError::internal()
    })?;
    headers.insert(header::LOCATION, location);
    Ok((StatusCode::FOUND, headers).into_response())
}

/// `GET /auth/github`: sends the browser to GitHub with a fresh state value.
pub async fn login(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LoginParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;

    let login = state
        .oauth
        .begin_login(params.redirect_uri.as_deref())
        .api_err("Failed to start login")?;

    let cookies = &state.config.cookie;
    let ttl = i64::try_from(state.config.oauth.state_ttl.as_secs()).unwrap_or(i64::MAX);

    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        build_cookie(STATE_COOKIE, &login.state, ttl, cookies).api_err("Failed to build state cookie")?,
    );
    headers.append(
        header::SET_COOKIE,
        build_cookie(RETURN_TO_COOKIE, &login.return_to, ttl, cookies)
            .api_err("Failed to build return cookie")?,
    );

    redirect(&login.authorization_url, headers)
}

/// `GET /auth/github/callback`. The login state is single use: its cookie is
/// cleared whatever the outcome.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let mut response = match complete(&state, &headers, params).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    for name in [STATE_COOKIE, RETURN_TO_COOKIE] {
        if let Ok(value) = clear_cookie(name, &state.config.cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

async fn complete(
    state: &AppState,
    headers: &HeaderMap,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;

    let expected_state = read_cookie(headers, STATE_COOKIE);
    let returned_state = params.state.unwrap_or_default();

    if let Err(err) = state
        .oauth
        .verify_state(&returned_state, expected_state.as_deref())
    {
        tracing::warn!("OAuth callback with mismatched state");
        return Err(err.into());
    }

    if let Some(error) = params.error {
        tracing::warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "GitHub declined the authorization"
        );
        return Err(AuthFailure::ExchangeFailed.into());
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let profile = state
        .oauth
        .complete_login(&code, &returned_state, expected_state.as_deref())
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "GitHub login failed");
            ApiError::from(err)
        })?;

    let identity = state
        .store
        .upsert_identity(&profile)
        .api_err("Failed to save identity")?;

    let token = state
        .tokens
        .issue(&identity.id, &identity.handle)
        .api_err("Failed to issue session token")?;

    tracing::info!(user_id = %identity.id, handle = %identity.handle, "User logged in");

    let mut response_headers = HeaderMap::new();
    response_headers.append(
        header::SET_COOKIE,
        build_cookie(
            SESSION_COOKIE,
            &token,
            state.tokens.lifetime_secs(),
            &state.config.cookie,
        )
        .api_err("Failed to build session cookie")?,
    );

    let return_to = sanitize_return_to(read_encoded_cookie(headers, RETURN_TO_COOKIE).as_deref());
    redirect(&return_to, response_headers)
}
