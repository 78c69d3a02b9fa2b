//! Caller identity
//!
//! Every ledger operation except `/health` is keyed by the caller's user id,
//! taken from a bearer token.

pub mod jwt;

pub use jwt::{extract_token_from_header, Claims, JwtValidator};

use crate::config::Config;
use crate::error::LedgerError;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub name: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
        }
    }
}

/// Build the validator the daemon should use
///
/// A configured secret always wins; dev mode falls back to the development secret.
pub fn validator_from_config(config: &Config) -> Result<JwtValidator, LedgerError> {
    match &config.jwt_secret {
        Some(secret) => JwtValidator::new(secret.clone(), config.jwt_expiry_seconds),
        None if config.dev_mode => Ok(JwtValidator::new_dev()),
        None => Err(LedgerError::Config(
            "jwt_secret is required (set LEDGER_JWT_SECRET or pass --dev)".into(),
        )),
    }
}

/// Resolve the caller from an `Authorization` header value
pub fn authenticate(validator: &JwtValidator, auth_header: Option<&str>) -> Result<Identity, LedgerError> {
    let token = extract_token_from_header(auth_header)
        .ok_or_else(|| LedgerError::Unauthorized("Missing bearer token".into()))?;
    let claims = validator.verify_token(token)?;
    if claims.sub.trim().is_empty() {
        return Err(LedgerError::Unauthorized("Token has no subject".into()));
    }
    Ok(claims.into())
}
