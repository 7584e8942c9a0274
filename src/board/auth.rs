//! Password hashing, session tokens and the signed-in user extractor.

use std::sync::LazyLock;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::api::{ApiError, SharedState};
use super::models::User;
use crate::config::AuthSection;
use crate::errors::BoardError;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub cookie_name: String,
    pub session_ttl: chrono::Duration,
}

impl From<&AuthSection> for AuthSettings {
    fn from(section: &AuthSection) -> Self {
        Self {
            cookie_name: section.cookie_name.clone(),
            session_ttl: chrono::Duration::hours(i64::from(section.session_ttl_hours)),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::from(&AuthSection::default())
    }
}

// ── Credentials ───────────────────────────────────────────────────────

pub fn new_session_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Hex SHA-256 of a session token. Only digests are stored.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Argon2id PHC string for `password` with a fresh random salt.
///
/// CPU-heavy; call from a blocking thread.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| anyhow::anyhow!("Failed to encode salt: {}", e))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn validate_email(email: &str) -> Result<String, BoardError> {
    let email = email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(BoardError::validation("Invalid email address"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), BoardError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BoardError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

// ── Cookies ───────────────────────────────────────────────────────────

pub fn session_cookie(settings: &AuthSettings, token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        settings.cookie_name,
        token,
        settings.session_ttl.num_seconds()
    )
}

pub fn clear_session_cookie(settings: &AuthSettings) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        settings.cookie_name
    )
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

// ── Extractors ────────────────────────────────────────────────────────

/// The signed-in user. Rejects with 401 when the session is missing,
/// unknown or expired.
pub struct CurrentUser(pub User);

/// The raw session token of the request, if any.
pub struct SessionToken(pub Option<String>);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &state.auth.cookie_name)
            .ok_or(BoardError::Unauthenticated)?;
        let now = Utc::now().naive_utc();
        let user = state
            .db
            .call(move |db| db.get_session_user(&token, now))
            .await?
            .ok_or(BoardError::Unauthenticated)?;
        Ok(CurrentUser(user))
    }
}

impl FromRequestParts<SharedState> for SessionToken {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        Ok(SessionToken(session_token(
            &parts.headers,
            &state.auth.cookie_name,
        )))
    }
}
