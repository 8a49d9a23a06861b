pub mod reset_session;
pub mod user;

pub use reset_session::ResetSessionRepository;
pub use user::UserRepository;
