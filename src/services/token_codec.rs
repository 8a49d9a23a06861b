use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// リセットトークンの署名コンテキストラベル
///
/// 同じ鍵で発行しうる他のトークン種別と区別する。
/// ラベルが異なれば署名検証は通らない。
const TOKEN_CONTEXT_LABEL: &str = "pw-reset";

/// トークンに埋め込まれるペイロード
///
/// 暗号化はせず署名のみ（内容は秘密ではないが、偽造・改変は不可）。
/// nonce により同時刻発行でもトークンが一意になる。
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetTokenPayload {
    pub user_id: Uuid,
    /// 発行時刻（unix秒）
    pub issued_at: i64,
    /// ランダム8バイト（base64エンコード）
    pub nonce: String,
}

/// 署名付きリセットトークンのエンコード/デコード
///
/// 署名鍵はコンストラクタで注入する（プロセスグローバルには持たない）。
#[derive(Clone)]
pub struct TokenCodec {
    secret_key: String,
}

impl TokenCodec {
    /// 新しい TokenCodec を作成
    pub fn new(secret_key: &str) -> Self {
        Self {
            secret_key: secret_key.to_string(),
        }
    }

    /// リセットトークンを発行
    ///
    /// 副作用なし。セッションへの保存は呼び出し側が行う
    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user_id: Uuid, issued_at: OffsetDateTime) -> Result<String, AppError> {
        let payload = ResetTokenPayload {
            user_id,
            issued_at: issued_at.unix_timestamp(),
            nonce: generate_nonce(),
        };

        let payload_json = serde_json::to_vec(&payload).map_err(|e| {
            tracing::error!(error = ?e, "ペイロードのシリアライズに失敗");
            AppError::Internal(anyhow::anyhow!("payload serialize error"))
        })?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signature = self.sign(&payload_b64);

        Ok(format!("{}.{}", payload_b64, signature))
    }

    /// トークンを検証してペイロードを取り出す
    ///
    /// # Security
    /// 署名不正・構造不正・期限切れは全て `AppError::InvalidToken` に集約する。
    /// 失敗時に部分的なペイロードを返さない。
    pub fn decode(&self, token: &str, max_age_secs: i64) -> Result<ResetTokenPayload, AppError> {
        self.decode_at(token, max_age_secs, OffsetDateTime::now_utc())
    }

    fn decode_at(
        &self,
        token: &str,
        max_age_secs: i64,
        now: OffsetDateTime,
    ) -> Result<ResetTokenPayload, AppError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(AppError::InvalidToken)?;

        // 署名検証（Mac::verify_slice は定数時間比較）
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AppError::InvalidToken)?;
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}.{}", TOKEN_CONTEXT_LABEL, payload_b64).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AppError::InvalidToken)?;

        // 署名が正当な場合のみペイロードをパース
        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::InvalidToken)?;
        let payload: ResetTokenPayload =
            serde_json::from_slice(&payload_json).map_err(|_| AppError::InvalidToken)?;

        // 有効期限チェック（now - issued_at <= max_age で有効）
        let age_secs = now.unix_timestamp() - payload.issued_at;
        if age_secs > max_age_secs {
            return Err(AppError::InvalidToken);
        }

        Ok(payload)
    }

    /// `label.payload` に対する HMAC-SHA256 署名を生成
    fn sign(&self, payload_b64: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}.{}", TOKEN_CONTEXT_LABEL, payload_b64).as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

/// ランダム8バイトの nonce を生成
fn generate_nonce() -> String {
    let mut bytes = [0u8; 8];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    const TEST_SECRET: &str = "test_secret_key_12345";
    const MAX_AGE_SECS: i64 = 3600;

    #[test]
    fn test_round_trip() {
        let codec = TokenCodec::new(TEST_SECRET);
        let user_id = Uuid::new_v4();

        let token = codec.issue(user_id).unwrap();
        let payload = codec.decode(&token, MAX_AGE_SECS).unwrap();

        assert_eq!(payload.user_id, user_id);
    }

    #[test]
    fn test_tokens_are_unique_per_issue() {
        // 同時刻発行でも nonce によりトークンが変わること
        let codec = TokenCodec::new(TEST_SECRET);
        let user_id = Uuid::new_v4();
        let issued_at = OffsetDateTime::now_utc();

        let first = codec.issue_at(user_id, issued_at).unwrap();
        let second = codec.issue_at(user_id, issued_at).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_tampered_token_fails() {
        let codec = TokenCodec::new(TEST_SECRET);
        let token = codec.issue(Uuid::new_v4()).unwrap();

        // ペイロード部の1文字を書き換え
        let mut chars: Vec<char> = token.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        let result = codec.decode(&tampered, MAX_AGE_SECS);
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let codec = TokenCodec::new(TEST_SECRET);
        let other = TokenCodec::new("another_secret_key");

        let token = codec.issue(Uuid::new_v4()).unwrap();
        let result = other.decode(&token, MAX_AGE_SECS);

        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_malformed_token_fails() {
        let codec = TokenCodec::new(TEST_SECRET);

        assert!(codec.decode("", MAX_AGE_SECS).is_err());
        assert!(codec.decode("no-dot-here", MAX_AGE_SECS).is_err());
        assert!(codec.decode("a.b.c", MAX_AGE_SECS).is_err());
        assert!(codec.decode("!!!.???", MAX_AGE_SECS).is_err());
    }

    #[test]
    fn test_decode_within_max_age() {
        let codec = TokenCodec::new(TEST_SECRET);
        let issued_at = OffsetDateTime::now_utc();
        let token = codec.issue_at(Uuid::new_v4(), issued_at).unwrap();

        // issued_at + 3599秒: 有効
        let result = codec.decode_at(&token, MAX_AGE_SECS, issued_at + Duration::seconds(3599));
        assert!(result.is_ok());
    }

    #[test]
    fn test_decode_at_exact_max_age() {
        // 境界: now - issued_at == max_age はまだ有効
        let codec = TokenCodec::new(TEST_SECRET);
        let issued_at = OffsetDateTime::now_utc();
        let token = codec.issue_at(Uuid::new_v4(), issued_at).unwrap();

        let result = codec.decode_at(&token, MAX_AGE_SECS, issued_at + Duration::seconds(3600));
        assert!(result.is_ok());
    }

    #[test]
    fn test_decode_past_max_age_fails() {
        let codec = TokenCodec::new(TEST_SECRET);
        let issued_at = OffsetDateTime::now_utc();
        let token = codec.issue_at(Uuid::new_v4(), issued_at).unwrap();

        // issued_at + 3601秒: 期限切れ
        let result = codec.decode_at(&token, MAX_AGE_SECS, issued_at + Duration::seconds(3601));
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }
}
