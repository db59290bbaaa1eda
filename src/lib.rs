//! Session, CSRF and rate-limit gateway for the Kai booking backend.

pub mod admin;
pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod users;

pub use config::GuardConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
