//! # Memora Hub Core
//!
//! Domain logic shared by the Memora Hub API: who may do what in a group,
//! how a login becomes a session, and how two-factor codes are checked.
//!
//! ## Module Organization
//!
//! - `auth`: roles, capabilities, guards, passwords, tokens, sessions, two-factor
//! - `models`: records and their PostgreSQL queries
//! - `store`: persistence traits with PostgreSQL and in-memory implementations
//! - `db`: connection pool and embedded migrations

pub mod auth;
pub mod db;
pub mod models;
pub mod store;

/// Current version of the Memora Hub core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
