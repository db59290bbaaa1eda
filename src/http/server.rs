//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, security headers)
//! - Own the security registries and their background sweepers
//! - Bind server to a plain or TLS listener
//! - Drain on shutdown, then stop the sweepers

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::auth::setup_auth_router;
use crate::config::GuardConfig;
use crate::net::tls::load_tls_config;
use crate::observability::metrics;
use crate::security::headers::security_headers;
use crate::security::Registries;
use crate::users::{InMemoryUserDirectory, UserDirectory};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GuardConfig>,
    pub registries: Registries,
    pub users: Arc<dyn UserDirectory>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: GuardConfig, users: Arc<dyn UserDirectory>) -> Self {
        let registries = Registries::from_config(&config);
        Self {
            config: Arc::new(config),
            registries,
            users,
            started_at: Instant::now(),
        }
    }
}

/// HTTP server for the session/CSRF/rate-limit gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server backed by an in-memory user directory.
    pub fn new(config: GuardConfig) -> Self {
        Self::with_users(config, Arc::new(InMemoryUserDirectory::new()))
    }

    pub fn with_users(config: GuardConfig, users: Arc<dyn UserDirectory>) -> Self {
        let state = AppState::new(config, users);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let mut router = Router::new()
            .route("/health", get(health))
            .merge(setup_auth_router(state.clone()));

        if config.admin.enabled {
            router = router.merge(setup_admin_router(state));
        }

        let router = router
            .layer(middleware::from_fn(record_request_metrics))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        if config.security.enable_headers {
            router.layer(middleware::from_fn_with_state(config.environment, security_headers))
        } else {
            router
        }
    }

    /// Shared state, for wiring and inspection.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GuardConfig {
        &self.state.config
    }

    /// The router, without binding a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweepers = self.state.registries.spawn_sweepers(&self.state.config);
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        sweepers.shutdown().await;
        tracing::info!("HTTP server stopped");
        result
    }

    /// Run the server behind rustls until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let Some(tls) = self.state.config.listener.tls.clone() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "TLS listener requested without listener.tls configuration",
            ));
        };
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        tracing::info!(address = %addr, "HTTPS server starting");

        let sweepers = self.state.registries.spawn_sweepers(&self.state.config);
        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            drain.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(app)
            .await;

        sweepers.shutdown().await;
        tracing::info!("HTTPS server stopped");
        result
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn record_request_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    async fn send(router: Router, request: Request<Body>) -> Response {
        router.oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let server = HttpServer::new(GuardConfig::default());
        let response = send(
            server.router(),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let server = HttpServer::new(GuardConfig::default());
        let response = send(
            server.router(),
            Request::get("/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mut config = GuardConfig::default();
        config.security.max_body_size = 1024;
        let server = HttpServer::new(config);

        let padding = "x".repeat(4096);
        let body = serde_json::json!({ "email": "a@b.co", "password": padding }).to_string();
        let response = send(
            server.router(),
            Request::post("/api/auth/register")
                .header("content-type", "application/json")
                .header("content-length", body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_production_sends_hsts() {
        let mut config = GuardConfig::default();
        config.environment = crate::config::Environment::Production;
        let server = HttpServer::new(config);
        let response = send(
            server.router(),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert!(response.headers().contains_key("strict-transport-security"));
    }

    #[tokio::test]
    async fn test_admin_router_mounted_only_when_enabled() {
        let mut config = GuardConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "k".repeat(32);
        let server = HttpServer::new(config);
        let response = send(
            server.router(),
            Request::get("/admin/rate-limits")
                .header("authorization", format!("Bearer {}", "k".repeat(32)))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404_with_admin_enabled() {
        let mut config = GuardConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "k".repeat(32);
        let server = HttpServer::new(config);
        let response = send(
            server.router(),
            Request::get("/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_envelope() {
        let server = HttpServer::new(GuardConfig::default());
        let response = send(
            server.router(),
            Request::post("/api/auth/login")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }
}
