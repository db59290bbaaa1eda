//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, trace, limits, security headers)
//!     → security::rate_limit (auth routes only)
//!     → middleware/session.rs (cookie → RequestContext.session)
//!     → middleware/csrf.rs (state-changing protected routes)
//!     → handler (auth::handlers, admin::handlers)
//!     → error.rs (ApiError → status + JSON body)
//! ```

pub mod context;
pub mod cookie;
pub mod error;
pub mod json;
pub mod middleware;
pub mod server;

pub use context::{CurrentSession, RequestContext};
pub use error::ApiError;
pub use json::ApiJson;
pub use server::{AppState, HttpServer};
