/// Database models for Memora Hub
///
/// Plain data records plus their PostgreSQL queries. Handlers do not call
/// these directly; they go through the [`store`](crate::store) traits so the
/// same code runs against PostgreSQL or the in-memory store.
///
/// # Models
///
/// - `user`: User accounts, global role and two-factor state
/// - `membership`: Groups and per-group roles
/// - `session`: Persisted login sessions
/// - `project`: Projects inside a group
/// - `task`: Tasks inside a project

pub mod membership;
pub mod project;
pub mod session;
pub mod task;
pub mod user;
