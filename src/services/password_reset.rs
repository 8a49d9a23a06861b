use std::sync::Arc;

use time::OffsetDateTime;

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;
use crate::repositories::{ResetSessionRepository, UserRepository};
use crate::services::rate_limiter::{self, RateDecision};
use crate::services::token_codec::TokenCodec;
use crate::services::{EmailService, auth::hash_password};

/// パスワードリセットワークフロー
///
/// request → レート制限チェック → トークン発行 → （後日）検証 → 消費
/// の一連の状態遷移を束ねる。セッション状態（users 行の3カラム）の変更は
/// 必ずこのサービス経由で行う。
#[derive(Clone)]
pub struct PasswordResetService {
    user_repo: UserRepository,
    session_repo: ResetSessionRepository,
    token_codec: TokenCodec,
    email_service: EmailService,
    config: Arc<Config>,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(
        user_repo: UserRepository,
        session_repo: ResetSessionRepository,
        token_codec: TokenCodec,
        email_service: EmailService,
        config: Arc<Config>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            token_codec,
            email_service,
            config,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も成功を返す（存在有無の漏洩防止）
    /// - 唯一外部から区別できる失敗はレート制限（`AppError::RateLimited`）
    /// - メール送信失敗はログに残して成功扱い（配信可否も漏洩させない）
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        // ユーザー検索
        let user = self.user_repo.find_by_email(email).await?;

        // ユーザーが存在しない場合も成功を返す（存在有無の漏洩防止）
        let user = match user {
            Some(u) => u,
            None => {
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
                return Ok(());
            }
        };

        let now = OffsetDateTime::now_utc();

        // レート制限チェック
        let window_lapsed = match rate_limiter::check(user.reset_attempts, user.last_reset_attempt, now)
        {
            RateDecision::Allowed { window_lapsed } => window_lapsed,
            RateDecision::Denied {
                retry_after_minutes,
            } => {
                tracing::warn!(email = %email, retry_after_minutes, "パスワードリセット: レート制限");
                return Err(AppError::RateLimited {
                    retry_after_minutes,
                });
            }
        };

        // 試行を記録（ウィンドウ経過時はカウンターをゼロに戻してから加算）
        let attempts = if window_lapsed {
            0
        } else {
            user.reset_attempts.unwrap_or(0)
        };
        self.session_repo
            .record_attempt(user.id, attempts + 1, now)
            .await?;

        // トークン発行。新規発行は前回のトークンを上書きして無効化する
        let token = self.token_codec.issue(user.id)?;
        let stored = self
            .session_repo
            .store_token(user.id, &token, user.last_reset_token.as_deref())
            .await?;
        if !stored {
            // 同時リクエストに負けた側。勝った側のトークンが有効なので
            // こちらのトークンは破棄し、レスポンスは成功のまま
            tracing::warn!(user_id = %user.id, "パスワードリセット: トークン保存が競合（破棄）");
            return Ok(());
        }

        // リセットURLを構築してメール送信
        let reset_url = build_reset_url(self.config.password_reset_url_base.as_deref(), &token);
        if let Err(e) = self
            .email_service
            .send_password_reset_email(email, &reset_url)
            .await
        {
            // 配信失敗でリクエストを失敗させない
            tracing::error!(email = %email, error = %e, "パスワードリセットメール送信失敗");
            return Ok(());
        }

        tracing::info!(email = %email, "パスワードリセットメール送信完了");

        Ok(())
    }

    /// トークンを検証してユーザーを返す（消費はしない）
    ///
    /// # Security
    /// 署名不正・期限切れ・ユーザー不在・セッショントークン不一致は
    /// 全て `AppError::InvalidToken` に集約する
    pub async fn verify_token(&self, token: &str) -> Result<User, AppError> {
        let payload = self
            .token_codec
            .decode(token, self.config.password_reset_token_ttl_secs)?;

        let session = self
            .session_repo
            .load(payload.user_id)
            .await?
            .ok_or(AppError::InvalidToken)?;

        // 最後に発行されたトークンとの完全一致を要求する。
        // 上書き済み（再発行後の旧トークン）と消費済みはここで弾かれる
        if session.last_reset_token.as_deref() != Some(token) {
            tracing::warn!(user_id = %session.user_id, "パスワードリセット: セッショントークン不一致");
            return Err(AppError::InvalidToken);
        }

        let user = self
            .user_repo
            .find_by_id(payload.user_id)
            .await?
            .ok_or(AppError::InvalidToken)?;

        Ok(user)
    }

    /// パスワードをリセット
    ///
    /// トークンの無効化はパスワード更新と同一のUPDATE文で行う。
    /// 同じトークンでの同時実行は片方しか成功しない。
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let user = self.verify_token(token).await?;

        // パスワードをargon2idハッシュ化
        let password_hash = hash_password(new_password)?;

        // 消費とパスワード更新をアトミックに実行
        let consumed = self
            .session_repo
            .consume_token_and_set_password(user.id, token, &password_hash)
            .await?;
        if !consumed {
            // verify 後に別リクエストが先に消費・上書きしたケース
            tracing::warn!(user_id = %user.id, "パスワードリセット: トークン消費が競合");
            return Err(AppError::InvalidToken);
        }

        tracing::info!(user_id = %user.id, "パスワードリセット完了");

        Ok(())
    }
}

/// トークンを埋め込んだリセットURLを構築
fn build_reset_url(base: Option<&str>, token: &str) -> String {
    match base {
        Some(base) => format!("{}?token={}", base, token),
        None => format!("http://localhost:3000/password-reset?token={}", token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ワークフロー本体のテストは PgPool が必要なため、
    // レート制限・トークン検証ロジックは各モジュールのユニットテストで担保する

    #[test]
    fn test_build_reset_url_with_base() {
        let url = build_reset_url(Some("https://learngate.example.com/password-reset"), "abc.def");
        assert_eq!(
            url,
            "https://learngate.example.com/password-reset?token=abc.def"
        );
    }

    #[test]
    fn test_build_reset_url_default() {
        let url = build_reset_url(None, "abc.def");
        assert_eq!(url, "http://localhost:3000/password-reset?token=abc.def");
    }
}
