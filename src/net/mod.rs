//! Network layer subsystem.
//!
//! Plain TCP listeners are bound in `main.rs` and handed to the HTTP server;
//! this module only covers the optional TLS path (tls.rs).

pub mod tls;
