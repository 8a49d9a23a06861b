pub mod reset_session;
pub mod user;

pub use reset_session::ResetSession;
pub use user::User;
