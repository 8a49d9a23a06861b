pub mod auth;
pub mod email;
pub mod password_reset;
pub mod rate_limiter;
pub mod token_codec;

pub use email::EmailService;
pub use password_reset::PasswordResetService;
pub use token_codec::TokenCodec;
