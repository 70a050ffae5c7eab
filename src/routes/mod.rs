pub mod account;
pub mod events;
pub mod favorites;
pub mod friendships;
pub mod realtime;
pub mod statuses;
pub mod users;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::records::Records;
use crate::state::AppState;

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 200;
/// Deepest offset a paged listing will fetch up to.
const MAX_WINDOW: usize = 10_000;

pub fn router() -> Router<AppState> {
    let api = Router::new()
        .merge(account::router())
        .merge(users::router())
        .merge(friendships::router())
        .merge(statuses::router())
        .merge(favorites::router())
        .merge(events::router())
        .merge(realtime::router());

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
}

async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let conn = state.db.get().map_err(|e| AppError::Internal(e.to_string()))?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(json!({ "status": "ok", "sessions": state.hub.len() })))
}

/// `?user_id=` or `?screen_name=`, id winning when both are given.
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
    pub screen_name: Option<String>,
}

impl UserQuery {
    pub async fn resolve(&self, records: &Records) -> AppResult<User> {
        match (self.user_id.as_deref(), self.screen_name.as_deref()) {
            (Some(id), _) if !id.is_empty() => records.find_user(id).await,
            (_, Some(handle)) if !handle.is_empty() => records.find_user_by_handle(handle).await,
            _ => Err(AppError::ParamsRequired),
        }
    }
}

/// Offset paging: skip `cursor` items, then take up to `limit`.
#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub cursor: Option<usize>,
    pub limit: Option<usize>,
}

impl Paging {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
    }

    /// How many items from the front must be fetched to serve this page.
    pub fn window(&self) -> usize {
        self.cursor
            .unwrap_or(0)
            .saturating_add(self.limit())
            .min(MAX_WINDOW)
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.cursor.unwrap_or(0))
            .take(self.limit())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db;

    pub(crate) struct TestApp {
        pub state: AppState,
        pub router: Router,
        _tmp: TempDir,
    }

    pub(crate) fn test_app() -> TestApp {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".into();
        let (state, _dispatcher) = AppState::new(pool, config);
        let router = super::router().with_state(state.clone());
        TestApp {
            state,
            router,
            _tmp: tmp,
        }
    }

    impl TestApp {
        pub async fn request(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        /// Sign up and return `(user_id, token)`.
        pub async fn signup(&self, handle: &str) -> (String, String) {
            let (status, body) = self
                .request(
                    "POST",
                    "/api/v1/account/create.json",
                    None,
                    Some(json!({
                        "screen_name": handle,
                        "email": format!("{}@example.com", handle),
                        "password": "password123",
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            (
                body["user"]["id"].as_str().unwrap().to_string(),
                body["token"].as_str().unwrap().to_string(),
            )
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_app();
        let (status, body) = app.request("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }

    #[test]
    fn paging_skips_and_caps() {
        let items: Vec<u32> = (0..10).collect();
        let paging = Paging {
            cursor: Some(3),
            limit: Some(4),
        };
        assert_eq!(paging.apply(items.clone()), vec![3, 4, 5, 6]);

        let past_end = Paging {
            cursor: Some(50),
            limit: None,
        };
        assert!(past_end.apply(items.clone()).is_empty());

        let zero = Paging {
            cursor: None,
            limit: Some(0),
        };
        assert_eq!(zero.limit(), 1);
        assert_eq!(Paging::default().apply(items).len(), 10);
    }

    #[test]
    fn window_saturates() {
        let huge = Paging {
            cursor: Some(usize::MAX),
            limit: Some(50),
        };
        assert_eq!(huge.window(), MAX_WINDOW);
        assert!(huge.apply(vec![1, 2, 3]).is_empty());
    }
}
