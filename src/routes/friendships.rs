use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::UserProfile;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::graph;
use crate::routes::UserQuery;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FriendshipRequest {
    #[serde(default)]
    pub screen_name: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friendships/create.json", post(create))
        .route("/friendships/destroy.json", post(destroy))
        .route("/friends/ids.json", get(friend_ids))
        .route("/friends/list.json", get(friend_list))
        .route("/followers/ids.json", get(follower_ids))
        .route("/followers/list.json", get(follower_list))
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(req): JsonBody<FriendshipRequest>,
) -> AppResult<Json<UserProfile>> {
    if req.screen_name.is_empty() {
        return Err(AppError::ParamsRequired);
    }
    let target = state.records.find_user_by_handle(&req.screen_name).await?;
    let (_, target) = graph::follow(&state.records, &current.id, &target.id).await?;
    Ok(Json(UserProfile::from(&target)))
}

async fn destroy(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(req): JsonBody<FriendshipRequest>,
) -> AppResult<Json<UserProfile>> {
    if req.screen_name.is_empty() {
        return Err(AppError::ParamsRequired);
    }
    let target = state.records.find_user_by_handle(&req.screen_name).await?;
    let (_, target) = graph::unfollow(&state.records, &current.id, &target.id).await?;
    Ok(Json(UserProfile::from(&target)))
}

async fn friend_ids(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<String>>> {
    let user = query.resolve(&state.records).await?;
    Ok(Json(graph::following_ids(&state.records, &user.id).await?))
}

async fn friend_list(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let user = query.resolve(&state.records).await?;
    let users = graph::following(&state.records, &user.id).await?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

async fn follower_ids(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<String>>> {
    let user = query.resolve(&state.records).await?;
    Ok(Json(graph::follower_ids(&state.records, &user.id).await?))
}

async fn follower_list(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let user = query.resolve(&state.records).await?;
    let users = graph::followers(&state.records, &user.id).await?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}
