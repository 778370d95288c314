//! Bearer token verification.
//!
//! Tokens are HMAC-signed JWTs. Validation is stateless: the decoding key and
//! the `Validation` settings are built once and shared across all requests.
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::models::JwtConfig;

const BEARER_PREFIX: &str = "Bearer ";

/// Identity extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header is missing or not a bearer token")]
    MissingOrMalformed,

    #[error("Token rejected: {0}")]
    Invalid(String),
}

pub trait TokenValidator: Send + Sync {
    /// Validate a raw `Authorization` header value.
    fn validate(&self, raw_header: &str) -> Result<Claims, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    sub: Option<String>,
    role: Option<String>,
    exp: i64,
}

pub struct JwtTokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtTokenValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::default();
        validation.algorithms = config.algorithms.clone();
        // Expiry is checked against the current second below, with no leeway.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    /// Validate against an explicit clock, in seconds since the Unix epoch.
    pub fn validate_at(&self, raw_header: &str, now: i64) -> Result<Claims, AuthError> {
        let token = raw_header
            .strip_prefix(BEARER_PREFIX)
            .ok_or(AuthError::MissingOrMalformed)?;

        let data = decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::Invalid(e.to_string()))?;
        let claims = data.claims;

        if claims.exp <= now {
            return Err(AuthError::Invalid(format!(
                "token expired at {} (now {now})",
                claims.exp
            )));
        }

        let user_id = claims
            .user_id
            .or(claims.sub)
            .ok_or_else(|| AuthError::Invalid("token has no userId or sub claim".to_string()))?;
        let role = claims
            .role
            .ok_or_else(|| AuthError::Invalid("token has no role claim".to_string()))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Invalid(format!("exp out of range: {}", claims.exp)))?;

        Ok(Claims {
            user_id,
            role,
            expires_at,
        })
    }
}

impl TokenValidator for JwtTokenValidator {
    fn validate(&self, raw_header: &str) -> Result<Claims, AuthError> {
        self.validate_at(raw_header, Utc::now().timestamp())
    }
}
