/// PostgreSQL plumbing
///
/// - [`pool`]: connection pool with a startup health check
/// - [`migrations`]: embedded schema migrations from `memora-shared/migrations/`
///
/// Queries themselves live with the [`models`](crate::models).

pub mod migrations;
pub mod pool;
