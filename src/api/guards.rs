use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::User;

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

/// Any active user holding a valid bearer token.
pub(crate) struct CurrentUser(pub(crate) User);

/// Teachers and admins.
pub(crate) struct CurrentStaff(pub(crate) User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = security::verify_token(token, state.settings()).map_err(|err| {
        tracing::debug!(error = %err, "Rejected bearer token");
        ApiError::Unauthorized(INVALID_CREDENTIALS)
    })?;

    let user = state
        .repositories()
        .users
        .find_by_id(&claims.sub)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("User not found"))?;

    if !user.is_active {
        tracing::debug!(user_id = %user.id, "Inactive user presented a token");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }
    Ok(user)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;
        authenticate(state, token).await.map(CurrentUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_staff() {
            return Err(ApiError::Forbidden("Teacher access required".to_string()));
        }
        Ok(CurrentStaff(user))
    }
}
