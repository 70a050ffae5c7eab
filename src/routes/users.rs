use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::UserProfile;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::UserQuery;
use crate::state::AppState;

const SEARCH_LIMIT: usize = 5;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/show.json", get(show))
        .route("/users/search.json", get(search))
        .route("/users/{id}", delete(destroy))
}

async fn show(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<UserProfile>> {
    let user = query.resolve(&state.records).await?;
    Ok(Json(UserProfile::from(&user)))
}

/// Prefix search over handles and display names. Requires a signed-in caller.
async fn search(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let prefix = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(AppError::ParamsRequired)?;
    let users = state.records.search_users(prefix, SEARCH_LIMIT).await?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

/// Delete an account. Only the account itself or an admin may do this.
async fn destroy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    if current.id != id && !current.is_admin {
        return Err(AppError::Forbidden);
    }

    state.records.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
