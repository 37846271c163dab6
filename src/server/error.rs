//! HTTPエラー

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::ml::ClassifyError;

pub type AppResult<T> = Result<T, AppError>;

/// ハンドラのエラー。本文は `{"error": メッセージ, "status": コード}`
///
/// 空または壊れた画像のアップロードは 400 で返す。200 と `{"error": ...}` を
/// 受け取る前提の既存クライアントとはこの点で互換性が無い。
#[derive(Debug)]
pub enum AppError {
    /// 入力の問題（400）
    BadRequest(String),
    /// アップロードが大きすぎる（413）
    PayloadTooLarge,
    /// 内部エラー（500、詳細はログのみ）
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "Uploaded file is too large"),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<ClassifyError> for AppError {
    fn from(err: ClassifyError) -> Self {
        if err.is_bad_input() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::PreprocessError;

    #[test]
    fn test_classify_error_mapping() {
        let bad = AppError::from(ClassifyError::Preprocess(PreprocessError::Empty));
        assert!(matches!(bad, AppError::BadRequest(_)));

        let internal = AppError::from(ClassifyError::EmptyOutput);
        assert!(matches!(internal, AppError::Internal(_)));
        assert_eq!(internal.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
