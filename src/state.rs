use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::repositories::{ResetSessionRepository, UserRepository};
use crate::services::{EmailService, TokenCodec};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// ユーザーリポジトリ
    pub user_repo: UserRepository,
    /// リセットセッションリポジトリ
    pub session_repo: ResetSessionRepository,
    /// リセットトークンのエンコード/デコード
    pub token_codec: TokenCodec,
    /// メールサービス
    pub email_service: EmailService,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Self {
        let config = Arc::new(config);
        let user_repo = UserRepository::new(db_pool.clone());
        let session_repo = ResetSessionRepository::new(db_pool.clone());
        let token_codec = TokenCodec::new(config.secret_key.expose_secret());
        let email_service = EmailService::new(config.clone());

        Self {
            db_pool,
            config,
            user_repo,
            session_repo,
            token_codec,
            email_service,
        }
    }
}
