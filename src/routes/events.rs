use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::db::models::Event;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::routes::Paging;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events.json", get(list))
}

/// Notifications addressed to the caller, newest first.
async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(paging): Query<Paging>,
) -> AppResult<Json<Vec<Event>>> {
    let events = state.records.events_for(&current.id, paging.window()).await?;
    Ok(Json(paging.apply(events)))
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn follow_shows_up_as_event() {
        let app = test_app();
        let (_, alice) = app.signup("alice").await;
        let (bob_id, bob) = app.signup("bob").await;

        app.request(
            "POST",
            "/api/v1/friendships/create.json",
            Some(&bob),
            Some(json!({"screen_name": "alice"})),
        )
        .await;

        let (status, body) = app.request("GET", "/api/v1/events.json", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["kind"], "follow");
        assert_eq!(body[0]["from_user_id"], bob_id.as_str());
        assert_eq!(body[0]["already_read"], false);

        let (_, body) = app.request("GET", "/api/v1/events.json", Some(&bob), None).await;
        assert_eq!(body, json!([]));
    }
}
