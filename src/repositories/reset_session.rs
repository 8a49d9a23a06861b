use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::ResetSession;

#[derive(Clone)]
pub struct ResetSessionRepository {
    pool: PgPool,
}

impl ResetSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ユーザーのリセットセッション状態を読み込み
    pub async fn load(&self, user_id: Uuid) -> Result<Option<ResetSession>, sqlx::Error> {
        sqlx::query_as::<_, ResetSession>(
            r#"
            SELECT id AS user_id, last_reset_token, reset_attempts, last_reset_attempt
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// リクエスト試行を記録
    ///
    /// カウンターの値はワークフロー側で計算する
    /// （ウィンドウ経過時のゼロリセットを含む）
    pub async fn record_attempt(
        &self,
        user_id: Uuid,
        attempts: i32,
        now: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_attempts = $2, last_reset_attempt = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(attempts)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 発行したトークンをセッションに保存（compare-and-set）
    ///
    /// `last_reset_token` が `expected_previous` のままである場合のみ上書きする。
    /// 同一ユーザーへの同時発行が競合した場合、負けた側は false を受け取る。
    ///
    /// # Returns
    /// 更新できた場合 true
    pub async fn store_token(
        &self,
        user_id: Uuid,
        token: &str,
        expected_previous: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_reset_token = $2, updated_at = NOW()
            WHERE id = $1 AND last_reset_token IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expected_previous)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// トークンを消費しつつ新しいパスワードを書き込む（compare-and-set）
    ///
    /// トークンの無効化とパスワード更新を1文で行う。
    /// `last_reset_token = $2` のガードにより、消費済み・上書き済みトークンでの
    /// 同時実行は片方しか成功しない。
    ///
    /// # Returns
    /// 更新できた場合 true（false はトークンが既に消費・無効化済み）
    pub async fn consume_token_and_set_password(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3, last_reset_token = NULL, updated_at = NOW()
            WHERE id = $1 AND last_reset_token = $2
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
