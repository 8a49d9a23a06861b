use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証エラー: {0}")]
    Authentication(String),

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("無効または期限切れのトークンです")]
    InvalidToken,

    #[error("リセットリクエストが多すぎます")]
    RateLimited {
        /// 次のリクエストが許可されるまでの分数（最小1）
        retry_after_minutes: i64,
    },

    #[error("メール送信エラー: {0}")]
    Delivery(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "メールアドレスまたはパスワードが正しくありません".to_string(),
            ),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::EmailAlreadyExists => (
                StatusCode::CONFLICT,
                "このメールアドレスは既に使用されています".to_string(),
            ),
            // 署名不正・期限切れ・使用済み・不一致は全て同一メッセージに集約
            // （どの条件で失敗したかを外部に漏らさない）
            Self::InvalidToken => (
                StatusCode::BAD_REQUEST,
                "無効または期限切れのトークンです".to_string(),
            ),
            Self::RateLimited {
                retry_after_minutes,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "リセットリクエストが多すぎます。{}分後に再試行してください",
                    retry_after_minutes
                ),
            ),
            Self::Delivery(e) => {
                // ワークフロー内で回収されるのが前提。ここに到達した場合も
                // 外部には汎用メッセージのみ返す
                tracing::error!(error = %e, "メール送信エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_returns_429() {
        let err = AppError::RateLimited {
            retry_after_minutes: 3,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_invalid_token_returns_400() {
        let response = AppError::InvalidToken.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_authentication_hides_detail() {
        // 内部詳細（"invalid_credentials" 等）がレスポンスに出ないこと
        let response = AppError::Authentication("invalid_credentials".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
