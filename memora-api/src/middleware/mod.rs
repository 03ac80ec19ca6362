/// Middleware for the API server
///
/// - `security`: security response headers
/// - `session_gate`: rejects requests without a valid session cookie

pub mod security;
pub mod session_gate;
