use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    /// 最後に発行されたリセットトークン
    ///
    /// 発行済みかつ未消費・未更新のときのみ Some。
    /// 新規発行のたびに上書きされ、前のトークンは無効になる
    /// （ユーザーごとに有効なトークンは常に最大1つ）。
    #[serde(skip)]
    pub last_reset_token: Option<String>,
    /// 現在のスロットリングウィンドウ内のリセットリクエスト数
    ///
    /// 一度もリセットしていないユーザーは NULL（0 として扱う）
    pub reset_attempts: Option<i32>,
    /// 最後のリセットリクエスト時刻
    pub last_reset_attempt: Option<OffsetDateTime>,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
