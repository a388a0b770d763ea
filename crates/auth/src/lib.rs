use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::Principal;
use thiserror::Error;

const SUBJECT_PREFIX: &str = "principal:";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub issuer: String,
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Error)]
pub enum SessionTokenError {
    #[error("session token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
    #[error("session token subject '{0}' does not name a principal")]
    MalformedSubject(String),
}

pub fn mint_session_token(
    cfg: &SessionConfig,
    principal: &Principal,
) -> Result<String, SessionTokenError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        iss: cfg.issuer.clone(),
        sub: format!("{SUBJECT_PREFIX}{}", principal.as_str()),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )?)
}

/// Returns the principal a token was issued to. Expired tokens, tokens
/// signed with another secret and tokens from another issuer are rejected.
pub fn verify_session_token(
    cfg: &SessionConfig,
    token: &str,
) -> Result<Principal, SessionTokenError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[cfg.issuer.as_str()]);
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &validation,
    )?;

    data.claims
        .sub
        .strip_prefix(SUBJECT_PREFIX)
        .filter(|name| !name.is_empty())
        .map(Principal::new)
        .ok_or(SessionTokenError::MalformedSubject(data.claims.sub))
}

/// Pulls the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
