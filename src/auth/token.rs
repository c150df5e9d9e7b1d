//! Session token issuance and validation.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AuthFailure, Error, Result};

pub const TOKEN_ISSUER: &str = "ecoci-auth-api";

/// Claims carried by every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id.
    pub sub: String,
    /// GitHub handle at issuance time.
    pub handle: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    /// Unique per token.
    pub jti: String,
}

/// Issues HS256 tokens with a fixed lifetime. There is no revocation list;
/// expiry is the only bound on a token's life.
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime_secs: i64,
}

impl TokenManager {
    pub fn new(secret: &[u8], lifetime_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime_secs,
        }
    }

    #[must_use]
    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    pub fn issue(&self, identity_id: &str, handle: &str) -> Result<String> {
        self.issue_at(identity_id, handle, Utc::now())
    }

    fn issue_at(&self, identity_id: &str, handle: &str, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: identity_id.to_string(),
            handle: handle.to_string(),
            iat,
            nbf: iat,
            exp: iat + self.lifetime_secs,
            iss: TOKEN_ISSUER.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("failed to sign token: {e}")))
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let failure = match e.kind() {
                    ErrorKind::ExpiredSignature => AuthFailure::Expired,
                    ErrorKind::InvalidSignature => AuthFailure::SignatureMismatch,
                    _ => AuthFailure::Invalid,
                };
                Error::Authentication(failure)
            })
    }

    /// Re-issues a token for the same subject. The input must still be valid.
    pub fn refresh(&self, token: &str) -> Result<String> {
        let claims = self.validate(token)?;
        self.issue(&claims.sub, &claims.handle)
    }
}
