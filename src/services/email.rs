use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;

/// メール送信サービス
///
/// `email` フィーチャー有効時は lettre で SMTP 送信、
/// 無効時（開発環境）はリセットURLをログに出力するのみ。
#[derive(Clone)]
pub struct EmailService {
    config: Arc<Config>,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// パスワードリセットメールを送信
    ///
    /// # Errors
    /// SMTP送信失敗時は `AppError::Delivery`。
    /// 呼び出し側（リセットワークフロー）はこれを回収してリクエストを成功扱いにする。
    pub async fn send_password_reset_email(
        &self,
        to: &str,
        reset_url: &str,
    ) -> Result<(), AppError> {
        #[cfg(feature = "email")]
        {
            if self.smtp_configured() {
                return self.send_smtp(to, reset_url).await;
            }
            tracing::warn!("SMTP未設定のため開発モードにフォールバック");
        }

        // 開発モード: メール送信せずログ出力のみ
        tracing::info!(to = %to, "パスワードリセットメール送信（開発モード）");
        tracing::info!("リセットURL: {}", reset_url);

        Ok(())
    }

    #[cfg(feature = "email")]
    fn smtp_configured(&self) -> bool {
        self.config.smtp_host.is_some()
            && self.config.smtp_username.is_some()
            && self.config.smtp_password.is_some()
            && self.config.smtp_from_address.is_some()
    }

    /// lettre による SMTP 送信
    #[cfg(feature = "email")]
    async fn send_smtp(&self, to: &str, reset_url: &str) -> Result<(), AppError> {
        use lettre::message::MultiPart;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
        use secrecy::ExposeSecret;

        let subject = "パスワードリセットのご案内";
        let text_body = format!(
            "以下のリンクからパスワードを再設定してください:\n\n{}\n\nこのリクエストに心当たりがない場合は、このメールを無視してください。変更は行われません。",
            reset_url
        );
        let html_body = format!(
            "<p>以下のリンクからパスワードを再設定してください:</p>\
             <p><a href=\"{}\">パスワードを再設定</a></p>\
             <p>このリクエストに心当たりがない場合は、このメールを無視してください。変更は行われません。</p>",
            reset_url
        );

        // smtp_configured() 確認後にのみ呼ばれる
        let host = self.config.smtp_host.as_deref().unwrap_or_default();
        let from = self.config.smtp_from_address.as_deref().unwrap_or_default();
        let username = self
            .config
            .smtp_username
            .as_ref()
            .map(|u| u.expose_secret().clone())
            .unwrap_or_default();
        let password = self
            .config
            .smtp_password
            .as_ref()
            .map(|p| p.expose_secret().clone())
            .unwrap_or_default();

        let message = Message::builder()
            .from(from
                .parse()
                .map_err(|e| AppError::Delivery(format!("invalid from address: {e}")))?)
            .to(to
                .parse()
                .map_err(|e| AppError::Delivery(format!("invalid to address: {e}")))?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text_body, html_body))
            .map_err(|e| AppError::Delivery(format!("message build error: {e}")))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| AppError::Delivery(format!("smtp relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(username, password))
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| AppError::Delivery(format!("smtp send error: {e}")))?;

        tracing::info!(to = %to, "パスワードリセットメール送信完了");

        Ok(())
    }
}
