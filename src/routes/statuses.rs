use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::collections::HashMap;

use crate::db::models::{Post, PostView, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::ingest;
use crate::records::Records;
use crate::routes::{Paging, UserQuery};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub status: String,
    pub in_reply_to_status_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ShowQuery {
    pub id: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/statuses/update.json", post(update))
        .route("/statuses/show.json", get(show))
        .route("/statuses/user_timeline.json", get(user_timeline))
        .route("/statuses/home_timeline.json", get(home_timeline))
        .route("/statuses/public_timeline.json", get(public_timeline))
}

/// Join posts with their authors, looking each author up once.
pub(crate) async fn views(records: &Records, posts: Vec<Post>) -> AppResult<Vec<PostView>> {
    let mut authors: HashMap<String, User> = HashMap::new();
    let mut views = Vec::with_capacity(posts.len());

    for post in posts {
        if !authors.contains_key(&post.author_id) {
            match records.find_user(&post.author_id).await {
                Ok(author) => {
                    authors.insert(author.id.clone(), author);
                }
                Err(AppError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        if let Some(author) = authors.get(&post.author_id) {
            views.push(PostView::new(&post, author));
        }
    }
    Ok(views)
}

async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(req): JsonBody<UpdateRequest>,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let view = ingest::create_post(
        &state.records,
        &state.publisher,
        &current.id,
        &req.status,
        req.in_reply_to_status_id.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn show(
    State(state): State<AppState>,
    Query(query): Query<ShowQuery>,
) -> AppResult<Json<PostView>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or(AppError::ParamsRequired)?;
    let post = state.records.find_post(&id).await?;
    let author = state.records.find_user(&post.author_id).await?;
    Ok(Json(PostView::new(&post, &author)))
}

async fn user_timeline(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    Query(paging): Query<Paging>,
) -> AppResult<Json<Vec<PostView>>> {
    let user = query.resolve(&state.records).await?;
    let ids: Vec<String> = user.posts.iter().rev().cloned().collect();
    let posts = state.records.find_posts(&paging.apply(ids)).await?;
    Ok(Json(posts.iter().map(|post| PostView::new(post, &user)).collect()))
}

/// The caller's posts and those of everyone they follow, newest first.
async fn home_timeline(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(paging): Query<Paging>,
) -> AppResult<Json<Vec<PostView>>> {
    let me = state.records.find_user(&current.id).await?;
    let mut ids = me.posts.clone();
    for followed in state.records.find_users(&me.following).await? {
        ids.extend(followed.posts);
    }
    // UUIDv7 ids sort by creation time
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.dedup();

    let posts = state.records.find_posts(&paging.apply(ids)).await?;
    Ok(Json(views(&state.records, posts).await?))
}

async fn public_timeline(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> AppResult<Json<Vec<PostView>>> {
    let ids = state.records.store().recent_post_ids(paging.window()).await?;
    let posts = state.records.find_posts(&paging.apply(ids)).await?;
    Ok(Json(views(&state.records, posts).await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::{test_app, TestApp};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn post(app: &TestApp, token: &str, text: &str) -> (StatusCode, Value) {
        app.request(
            "POST",
            "/api/v1/statuses/update.json",
            Some(token),
            Some(json!({ "status": text })),
        )
        .await
    }

    #[tokio::test]
    async fn update_enforces_length() {
        let app = test_app();
        let (_, token) = app.signup("alice").await;

        let (status, body) = post(&app, &token, &"a".repeat(140)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["author"]["screen_name"], "alice");

        let (status, body) = post(&app, &token, &"a".repeat(141)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "post text too long");

        let (status, body) = post(&app, &token, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "parameters required");
    }

    #[tokio::test]
    async fn show_returns_post() {
        let app = test_app();
        let (_, token) = app.signup("alice").await;
        let (_, created) = post(&app, &token, "hello").await;

        let uri = format!("/api/v1/statuses/show.json?id={}", created["id"].as_str().unwrap());
        let (status, body) = app.request("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);

        let (status, _) = app
            .request("GET", "/api/v1/statuses/show.json?id=missing", None, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn timelines_order_and_scope() {
        let app = test_app();
        let (_, alice) = app.signup("alice").await;
        let (_, bob) = app.signup("bob").await;
        let (_, carol) = app.signup("carol").await;

        app.request(
            "POST",
            "/api/v1/friendships/create.json",
            Some(&bob),
            Some(json!({"screen_name": "alice"})),
        )
        .await;

        post(&app, &alice, "a1").await;
        post(&app, &carol, "c1").await;
        post(&app, &bob, "b1").await;
        post(&app, &alice, "a2").await;

        let (_, home) = app
            .request("GET", "/api/v1/statuses/home_timeline.json", Some(&bob), None)
            .await;
        let texts: Vec<_> = home.as_array().unwrap().iter().map(|p| p["text"].clone()).collect();
        assert_eq!(texts, vec![json!("a2"), json!("b1"), json!("a1")]);

        let (_, mine) = app
            .request(
                "GET",
                "/api/v1/statuses/user_timeline.json?screen_name=alice&limit=1",
                None,
                None,
            )
            .await;
        assert_eq!(mine.as_array().unwrap().len(), 1);
        assert_eq!(mine[0]["text"], "a2");

        let (_, public) = app
            .request(
                "GET",
                "/api/v1/statuses/public_timeline.json?cursor=1&limit=2",
                None,
                None,
            )
            .await;
        let texts: Vec<_> = public.as_array().unwrap().iter().map(|p| p["text"].clone()).collect();
        assert_eq!(texts, vec![json!("b1"), json!("c1")]);
    }

    #[tokio::test]
    async fn huge_cursor_is_an_empty_page() {
        let app = test_app();
        let (_, alice) = app.signup("alice").await;
        post(&app, &alice, "only").await;

        for uri in [
            "/api/v1/statuses/public_timeline.json?cursor=18446744073709551615",
            "/api/v1/statuses/public_timeline.json?cursor=9223372036854775808&limit=200",
            "/api/v1/statuses/user_timeline.json?screen_name=alice&cursor=18446744073709551615",
        ] {
            let (status, body) = app.request("GET", uri, None, None).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body, json!([]), "{uri}");
        }

        let (status, body) = app
            .request(
                "GET",
                "/api/v1/events.json?cursor=18446744073709551615",
                Some(&alice),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn home_timeline_requires_token() {
        let app = test_app();
        let (status, _) = app
            .request("GET", "/api/v1/statuses/home_timeline.json", None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
