use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ユーザーごとのリセットセッション状態
///
/// users テーブル上の3カラムをまとめたビュー。
/// レート制限の判定とトークン有効性チェックの裏付けになる。
/// 更新は必ず ResetSessionRepository 経由で行う（ハンドラーから直接触らない）。
#[derive(Debug, FromRow)]
pub struct ResetSession {
    pub user_id: Uuid,
    pub last_reset_token: Option<String>,
    pub reset_attempts: Option<i32>,
    pub last_reset_attempt: Option<OffsetDateTime>,
}
