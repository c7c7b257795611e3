//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a specific entity.

pub mod audit;
pub mod token;
pub mod user;

pub use audit::{AuditRepository, SqlxAuditRepository};
pub use token::{SqlxTokenRepository, TokenRepository};
pub use user::{SqlxUserRepository, UserRepository};
