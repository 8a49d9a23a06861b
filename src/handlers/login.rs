use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// ユーザーのメールアドレス
    pub email: String,
    /// ユーザーのパスワード
    pub password: String,
}

/// ログインレスポンス
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: Uuid,
    pub email: String,
}

/// ログインハンドラー
///
/// POST /api/login
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー認証（DB照合）
/// 3. 最終ログイン時刻を更新
///
/// # Security
/// 認証失敗はユーザー不在・パスワード不一致を区別せず同一エラーになる
/// （AuthService 側で集約）。
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    // 1. リクエストバリデーション
    validate_login_request(&request)?;

    // 2. ユーザー認証（DB照合）
    let auth_service = AuthService::new(state.user_repo.clone());
    let user = auth_service
        .authenticate(&request.email, &request.password)
        .await?;

    // 3. 最終ログイン時刻を更新
    state.user_repo.update_last_login(user.id).await?;

    Ok(Json(LoginResponse {
        id: user.id,
        email: user.email,
    }))
}

/// ログインリクエストのバリデーション
fn validate_login_request(request: &LoginRequest) -> Result<(), AppError> {
    // email: 必須、メール形式
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }

    // 簡易的なメール形式チェック（@ が含まれているか）
    if !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }

    // password: 必須
    if request.password.is_empty() {
        return Err(AppError::Validation("パスワードは必須です".to_string()));
    }

    Ok(())
}
