use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::helpers::{SESSION_COOKIE, read_cookie};
use super::token::Claims;
use crate::error::AuthFailure;
use crate::server::AppState;
use crate::server::response::{ApiError, StoreResultExt};
use crate::types::{Authorize, Capability, Identity};

/// Extractor that requires a valid session cookie and a still-existing identity.
pub struct RequireAuth {
    pub identity: Identity,
    pub claims: Claims,
    /// The raw token, for re-issuance.
    pub token: String,
}

/// Extractor that additionally requires the `ManageIdentities` capability.
pub struct RequireAdmin {
    pub identity: Identity,
}

impl RequireAuth {
    /// Rejects with 403 unless the caller's role grants `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.identity.permits(capability) {
            return Ok(());
        }
        tracing::warn!(handle = %self.identity.handle, ?capability, "Capability denied");
        Err(ApiError::forbidden("Insufficient permissions"))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, SESSION_COOKIE).ok_or(AuthFailure::MissingToken)?;

        let claims = state.tokens.validate(&token).map_err(ApiError::from)?;

        // A deleted identity's outstanding tokens stop working here.
        let identity = state
            .store
            .get_identity(&claims.sub)
            .api_err("Failed to load session identity")?
            .ok_or(AuthFailure::Invalid)?;

        Ok(RequireAuth {
            identity,
            claims,
            token,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state).await?;

        if !auth.identity.permits(Capability::ManageIdentities) {
            tracing::warn!(handle = %auth.identity.handle, "Admin access denied");
            return Err(ApiError::forbidden("Admin access required"));
        }

        Ok(RequireAdmin {
            identity: auth.identity,
        })
    }
}
