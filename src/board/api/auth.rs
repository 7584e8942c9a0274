use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, JsonBody, SharedState, required_name};
use crate::board::auth::{
    CurrentUser, SessionToken, clear_session_cookie, hash_password, new_session_token,
    session_cookie, validate_email, validate_password, verify_password,
};
use crate::board::models::User;
use crate::errors::BoardError;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

fn signed_in(
    state: &SharedState,
    status: StatusCode,
    user: User,
    token: String,
) -> Response {
    let cookie = session_cookie(&state.auth, &token);
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse { user, token }),
    )
        .into_response()
}

pub(super) async fn register(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required_name("name", &req.name)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::Error::new(e).context("Password hashing task failed"))??;
    let token = new_session_token();
    let expires_at = Utc::now().naive_utc() + state.auth.session_ttl;
    let session_token = token.clone();
    let user = state
        .db
        .call(move |db| {
            db.transaction(|db| {
                let user = db.create_user(&name, &email, &hash)?;
                db.create_session(user.id, &session_token, expires_at)?;
                Ok(user)
            })
        })
        .await?;
    info!(user_id = user.id, "User registered");
    Ok(signed_in(&state, StatusCode::CREATED, user, token))
}

pub(super) async fn login(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let creds = state
        .db
        .call(move |db| db.find_user_credentials(&email))
        .await?
        .ok_or(BoardError::InvalidCredentials)?;

    let password = req.password;
    let stored_hash = creds.password_hash;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| anyhow::Error::new(e).context("Password check task failed"))?;
    if !verified {
        return Err(BoardError::InvalidCredentials.into());
    }

    let token = new_session_token();
    let now = Utc::now().naive_utc();
    let expires_at = now + state.auth.session_ttl;
    let session_token = token.clone();
    let user = creds.user;
    let user_id = user.id;
    state
        .db
        .call(move |db| {
            db.purge_expired_sessions(now)?;
            db.create_session(user_id, &session_token, expires_at)
        })
        .await?;
    info!(user_id = user.id, "User signed in");
    Ok(signed_in(&state, StatusCode::OK, user, token))
}

pub(super) async fn logout(
    State(state): State<SharedState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = token {
        state.db.call(move |db| db.delete_session(&token)).await?;
    }
    Ok((
        [(header::SET_COOKIE, clear_session_cookie(&state.auth))],
        Json(serde_json::json!({"success": true})),
    ))
}

pub(super) async fn current(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_register_sets_cookie_and_returns_token() {
        let app = TestApp::new();
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"name": "Ada", "email": "ada@example.com", "password": "secret123"})
                    .to_string(),
            ))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("workboard-session="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_register_validation_and_duplicates() {
        let app = TestApp::new();
        let (status, _) = app
            .request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"name": "  ", "email": "ada@example.com", "password": "secret123"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"name": "Ada", "email": "ada@example.com", "password": "123"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.sign_up("Ada", "ada@example.com").await;
        let (status, body) = app
            .request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"name": "Ada", "email": "ADA@example.com", "password": "secret123"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already registered"));
    }

    #[tokio::test]
    async fn test_login_current_logout() {
        let app = TestApp::new();
        app.sign_up("Ada", "ada@example.com").await;

        let (status, _) = app
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "ada@example.com", "password": "wrong-pass"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "Ada@Example.com", "password": "secret123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = app.request("GET", "/api/auth/current", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ada@example.com");

        let (status, _) = app.request("POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.request("GET", "/api/auth/current", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_cookie_authenticates() {
        let app = TestApp::new();
        let token = app.sign_up("Ada", "ada@example.com").await;
        let request = Request::builder()
            .uri("/api/auth/current")
            .header(header::COOKIE, format!("workboard-session={}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_current_requires_session() {
        let app = TestApp::new();
        let (status, body) = app.request("GET", "/api/auth/current", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = app
            .request("GET", "/api/auth/current", Some("not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
