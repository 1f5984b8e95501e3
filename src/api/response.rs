use crate::utils::error::GuardianError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

pub type ApiResult<T = Json<Value>> = Result<T, ApiError>;

/// `{"success": false, "detail": ...}` 錯誤回應
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }
}

impl From<GuardianError> for ApiError {
    fn from(err: GuardianError) -> Self {
        let status = match &err {
            GuardianError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            GuardianError::NotFound { .. } => StatusCode::NOT_FOUND,
            GuardianError::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(
                "❌ Request failed: {} (Category: {:?}, Severity: {:?})",
                err,
                err.category(),
                err.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", err.recovery_suggestion());
        }

        Self::new(status, err.user_friendly_message())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        GuardianError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "detail": self.detail,
        }));
        (self.status, body).into_response()
    }
}

pub fn ok<T: Serialize>(data: T) -> ApiResult {
    Ok(Json(json!({
        "success": true,
        "data": serde_json::to_value(data)?,
    })))
}

/// 列表回應會附上 `total`
pub fn ok_list<T: Serialize>(items: &[T]) -> ApiResult {
    Ok(Json(json!({
        "success": true,
        "data": serde_json::to_value(items)?,
        "total": items.len(),
    })))
}

pub fn ok_with_message<T: Serialize>(message: &str, data: T) -> ApiResult {
    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": serde_json::to_value(data)?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GuardianError::validation("Description is required"), StatusCode::BAD_REQUEST),
            (GuardianError::not_found("Workflow", "w-1"), StatusCode::NOT_FOUND),
            (
                GuardianError::Conflict {
                    message: "busy".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                GuardianError::StorageError {
                    message: "down".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }

    #[test]
    fn test_not_found_detail_hides_id() {
        let err = ApiError::from(GuardianError::not_found("Agent", "agent-x"));
        assert_eq!(err.detail, "Agent not found");
    }
}
