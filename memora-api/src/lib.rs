//! # Memora Hub API Server Library
//!
//! The HTTP layer over `memora-shared`: configuration, the axum router,
//! the session gate, and the route handlers.
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: configuration from the environment
//! - `error`: error type and HTTP response mapping
//! - `extract`: the authenticated-user extractor
//! - `middleware`: session gate and security headers
//! - `routes`: route handlers
//!
//! The router runs equally over PostgreSQL and the in-memory store:
//!
//! ```no_run
//! use memora_api::{app::{build_router, AppState}, config::Config};
//! use memora_shared::store::Stores;
//!
//! # fn example() -> anyhow::Result<()> {
//! let app = build_router(AppState::new(Stores::in_memory(), Config::from_env()?));
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
