//! Business logic services

pub mod account;
pub mod password;
pub mod session;
pub mod signer;

pub use account::{AccountService, AccountServiceError, RegisterInput};
pub use session::{AuthFailure, AutoLoginOutcome, SessionError, SessionManager};
pub use signer::{token_hash, TokenError, TokenSigner};
