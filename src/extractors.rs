use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::state::AppState;

/// The caller identified by a valid bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub is_admin: bool,
}

/// Extractor that requires authentication.
/// Returns 401 if the bearer token is missing or invalid.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let identity = state.tokens.verify(token)?;

        Ok(CurrentUser {
            id: identity.user_id,
            is_admin: identity.admin,
        })
    }
}

/// JSON body whose rejections use the API's error shape.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => Err(AppError::ParamsRequired),
            Err(e) => {
                tracing::debug!("Rejected request body: {}", e);
                Err(AppError::BadFormat("bad format".into()))
            }
        }
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
