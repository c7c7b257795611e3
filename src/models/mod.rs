//! Domain models

pub mod token;
pub mod user;

pub use token::{AuthEvent, AuthEventKind, RevocationRecord, TokenClaims, TokenKind};
pub use user::User;
