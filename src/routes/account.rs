use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::password;
use crate::db::models::{ProfileUpdate, User, UserProfile};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SettingsRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub profile_image_url: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/account/create.json", post(create))
        .route("/account/login.json", post(login))
        .route("/account/settings.json", post(update_settings).get(settings))
}

fn valid_handle(handle: &str) -> bool {
    (1..=20).contains(&handle.chars().count())
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

async fn create(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> AppResult<(StatusCode, Json<LoginResponse>)> {
    if req.screen_name.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::ParamsRequired);
    }
    if !valid_handle(&req.screen_name) || !valid_email(&req.email) {
        return Err(AppError::BadFormat("bad format".into()));
    }

    let hash = password::hash(&req.password).await?;
    let user = state
        .records
        .create_user(&User::new(&req.screen_name, &req.email, hash))
        .await?;

    let token = state.tokens.issue(&user.id, user.is_admin)?;
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: UserProfile::from(&user),
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    if req.screen_name.is_empty() || req.password.is_empty() {
        return Err(AppError::ParamsRequired);
    }

    let user = match state.records.find_user_by_handle(&req.screen_name).await {
        Ok(user) => user,
        Err(AppError::NotFound) => return Err(AppError::LoginFailed),
        Err(e) => return Err(e),
    };
    if !password::verify(&req.password, &user.password_hash).await {
        return Err(AppError::LoginFailed);
    }
    if user.suspended {
        return Err(AppError::Suspended);
    }

    let token = state.tokens.issue(&user.id, user.is_admin)?;
    tracing::info!("{} logged in", user.handle);
    Ok(Json(LoginResponse {
        token,
        user: UserProfile::from(&user),
    }))
}

async fn settings(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<Json<UserProfile>> {
    let user = state.records.find_user(&current.id).await?;
    Ok(Json(UserProfile::from(&user)))
}

async fn update_settings(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(req): JsonBody<SettingsRequest>,
) -> AppResult<Json<UserProfile>> {
    let update = ProfileUpdate {
        display_name: req.name,
        bio: req.description,
        location: req.location,
        website_url: req.url,
        avatar_url: req.profile_image_url,
    };
    let user = state.records.update_profile(&current.id, &update).await?;
    Ok(Json(UserProfile::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::test_app;
    use serde_json::json;

    #[test]
    fn handle_rules() {
        assert!(valid_handle("alice_01"));
        assert!(!valid_handle(""));
        assert!(!valid_handle("has space"));
        assert!(!valid_handle(&"a".repeat(21)));
    }

    #[test]
    fn email_rules() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("a@localhost"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("plain"));
    }

    #[tokio::test]
    async fn signup_returns_token_and_profile() {
        let app = test_app();
        let (status, body) = app
            .request(
                "POST",
                "/api/v1/account/create.json",
                None,
                Some(json!({"screen_name": "alice", "email": "a@example.com", "password": "pw"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["screen_name"], "alice");
        assert!(body["user"].get("password_hash").is_none());
        assert!(body["user"].get("email").is_none());

        let token = body["token"].as_str().unwrap();
        let identity = app.state.tokens.verify(token).unwrap();
        assert_eq!(identity.user_id, body["user"]["id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let app = test_app();
        app.signup("alice").await;
        let (status, body) = app
            .request(
                "POST",
                "/api/v1/account/create.json",
                None,
                Some(json!({"screen_name": "alice", "email": "other@example.com", "password": "pw"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "resource duplicated");
    }

    #[tokio::test]
    async fn signup_requires_fields() {
        let app = test_app();
        let (status, body) = app
            .request(
                "POST",
                "/api/v1/account/create.json",
                None,
                Some(json!({"screen_name": "alice"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "parameters required");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_format() {
        let app = test_app();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/account/create.json")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{nope"))
            .unwrap();
        let response = tower::ServiceExt::oneshot(app.router.clone(), request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_checks_password() {
        let app = test_app();
        app.signup("alice").await;

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/account/login.json",
                None,
                Some(json!({"screen_name": "alice", "password": "password123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].is_string());

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/account/login.json",
                None,
                Some(json!({"screen_name": "alice", "password": "wrong"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "login failed");

        let (status, _) = app
            .request(
                "POST",
                "/api/v1/account/login.json",
                None,
                Some(json!({"screen_name": "nobody", "password": "x"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let app = test_app();
        let (_id, token) = app.signup("alice").await;

        let (status, body) = app
            .request(
                "POST",
                "/api/v1/account/settings.json",
                Some(&token),
                Some(json!({"name": "Alice", "location": "Tokyo"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Alice");

        let (status, body) = app
            .request("GET", "/api/v1/account/settings.json", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], "Tokyo");
    }

    #[tokio::test]
    async fn settings_require_token() {
        let app = test_app();
        let (status, body) = app
            .request("GET", "/api/v1/account/settings.json", None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid jwt token");
    }
}
