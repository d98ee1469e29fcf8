use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiResponse;

/// Everything a handler can fail with. Storage and upstream failures are
/// logged here and surface to the caller as a generic message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Upstream error: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database failure: {}", e);
                "일시적인 오류가 발생했습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            AppError::Upstream(e) => {
                tracing::error!("upstream failure: {:#}", e);
                "외부 서비스 오류가 발생했습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

// Malformed bodies and query strings keep the JSON envelope.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("요청 본문이 올바르지 않습니다: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(format!("요청 파라미터가 올바르지 않습니다: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Validation(format!("업로드 형식이 올바르지 않습니다: {}", rejection.body_text()))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(AppError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Upstream(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_internal_detail_not_leaked() {
        let resp = AppError::Upstream(anyhow::anyhow!("secret api key rejected")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_text(resp).await;
        assert!(!body.contains("secret api key"));
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["ok"], false);
        assert!(json["message"].as_str().unwrap().contains("외부 서비스 오류"));
    }

    #[tokio::test]
    async fn test_validation_message_is_returned() {
        let resp = AppError::validation("이름을 입력해주세요").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json, serde_json::json!({"ok": false, "message": "이름을 입력해주세요"}));
    }
}
