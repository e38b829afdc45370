use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cacheward_core::cache::CacheError;

/// A cache failure surfaced by an admin endpoint.
#[derive(Debug)]
pub struct AppError(pub CacheError);

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            CacheError::ConnectionFailed(_) | CacheError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::InvalidPattern(_) => StatusCode::BAD_REQUEST,
            CacheError::OperationFailed(_) | CacheError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        (
            status_code,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        Self(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                CacheError::ConnectionFailed("refused".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CacheError::Timeout("2s".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CacheError::InvalidPattern("job:[78]".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CacheError::OperationFailed("WRONGTYPE".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }
}
