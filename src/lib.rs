//! RequirementIQ - account and session backend
//!
//! This library provides authentication, session-token management, and the
//! supporting persistence layer for the RequirementIQ platform.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
