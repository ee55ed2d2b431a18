use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use compsync_common::error::CompsyncError;
use compsync_sync::SyncError;

pub struct ApiError(pub CompsyncError);

impl From<CompsyncError> for ApiError {
    fn from(err: CompsyncError) -> Self {
        Self(err)
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err.into())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(CompsyncError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(CompsyncError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CompsyncError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            CompsyncError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            CompsyncError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            other => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: CompsyncError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn maps_error_kinds_to_status_codes() {
        assert_eq!(status_of(CompsyncError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CompsyncError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(CompsyncError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CompsyncError::Database("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn already_running_is_a_conflict() {
        let response = ApiError::from(SyncError::AlreadyRunning).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
