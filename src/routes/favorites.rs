use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::PostView;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FavoriteRequest {
    #[serde(default)]
    pub id: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/favorites/create.json", post(create))
        .route("/favorites/destroy.json", post(destroy))
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(req): JsonBody<FavoriteRequest>,
) -> AppResult<Json<PostView>> {
    if req.id.is_empty() {
        return Err(AppError::ParamsRequired);
    }
    let post = state.records.like(&current.id, &req.id).await?;
    let author = state.records.find_user(&post.author_id).await?;
    Ok(Json(PostView::new(&post, &author)))
}

async fn destroy(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(req): JsonBody<FavoriteRequest>,
) -> AppResult<Json<PostView>> {
    if req.id.is_empty() {
        return Err(AppError::ParamsRequired);
    }
    let post = state.records.unlike(&current.id, &req.id).await?;
    let author = state.records.find_user(&post.author_id).await?;
    Ok(Json(PostView::new(&post, &author)))
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn like_and_unlike() {
        let app = test_app();
        let (_, alice) = app.signup("alice").await;
        let (bob_id, bob) = app.signup("bob").await;

        let (_, created) = app
            .request(
                "POST",
                "/api/v1/statuses/update.json",
                Some(&alice),
                Some(json!({"status": "like me"})),
            )
            .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = app
            .request("POST", "/api/v1/favorites/create.json", Some(&bob), Some(json!({ "id": id })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["favorite_count"], 1);
        assert_eq!(body["favorited_ids"], json!([bob_id]));

        let (status, body) = app
            .request("POST", "/api/v1/favorites/destroy.json", Some(&bob), Some(json!({ "id": id })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["favorite_count"], 0);
    }

    #[tokio::test]
    async fn like_missing_post() {
        let app = test_app();
        let (_, bob) = app.signup("bob").await;
        let (status, _) = app
            .request(
                "POST",
                "/api/v1/favorites/create.json",
                Some(&bob),
                Some(json!({"id": "missing"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
