use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::ServiceError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(&'static str),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => ApiError::BadRequest(message),
            ServiceError::RestrictionViolation(message) => ApiError::Forbidden(message),
            err @ ServiceError::AttemptLimitExceeded { .. } => ApiError::Forbidden(err.to_string()),
            ServiceError::Forbidden(message) => ApiError::Forbidden(message.to_string()),
            err @ ServiceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ServiceError::Conflict(message) => ApiError::Conflict(message.to_string()),
            ServiceError::Persistence(err) => {
                tracing::error!(error = %err, "Persistence failure");
                ApiError::ServiceUnavailable("Storage is temporarily unavailable".to_string())
            }
            ServiceError::Internal(message) => ApiError::Internal(message.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) => {
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::TooManyRequests(message) => message.to_string(),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                message
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            ApiError::Forbidden(message)
            | ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message) => message,
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::ApiError;
    use crate::repositories::RepositoryError;
    use crate::services::ServiceError;

    fn status_of(err: ServiceError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn service_errors_map_to_http_statuses() {
        assert_eq!(status_of(ServiceError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ServiceError::RestrictionViolation("linux".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ServiceError::AttemptLimitExceeded { max: 2 }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(ServiceError::NotFound("Attempt")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ServiceError::Conflict("again")), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ServiceError::Persistence(RepositoryError::Unavailable("pool".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(ServiceError::Internal("boom")), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
