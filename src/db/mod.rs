//! Database layer
//!
//! Supports SQLite (default, single-binary deployment) and MySQL behind the
//! `DatabasePool` trait; the driver is selected from configuration. Schema
//! changes are embedded code-based migrations run at startup.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
