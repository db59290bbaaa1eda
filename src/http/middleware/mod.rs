//! Request guards applied per route.
//!
//! Layer order on a protected route: `require_session` first, then
//! `require_csrf`. Rate limiting lives in `security::rate_limit` and is only
//! mounted on the auth routes.

pub mod csrf;
pub mod session;

pub use csrf::require_csrf;
pub use session::require_session;
