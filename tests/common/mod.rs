//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use kai_guard::config::GuardConfig;
use kai_guard::http::{AppState, HttpServer};
use kai_guard::lifecycle::Shutdown;
use kai_guard::users::{hash_password, InMemoryUserDirectory, UserDirectory};
use reqwest::header::SET_COOKIE;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Add a user straight to the directory, bypassing the register route.
    #[allow(dead_code)]
    pub fn seed_user(&self, email: &str) -> u64 {
        let hash = hash_password(PASSWORD).unwrap();
        self.state.users.insert(email, "Seeded", hash).unwrap().id
    }

    /// Log in and return the `name=value` session cookie.
    #[allow(dead_code)]
    pub async fn login(&self, email: &str, client_ip: &str) -> String {
        let res = self
            .client
            .post(self.url("/api/auth/login"))
            .header("x-forwarded-for", client_ip)
            .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200, "login should succeed");
        session_cookie(&res).expect("login sets the session cookie")
    }

    /// Fetch the current CSRF token for a session.
    #[allow(dead_code)]
    pub async fn csrf_token(&self, cookie: &str) -> String {
        let res = self
            .client
            .get(self.url("/api/auth/csrf-token"))
            .header("cookie", cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = res.json().await.unwrap();
        body["csrfToken"].as_str().unwrap().to_string()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

/// Start the server on an ephemeral port.
pub async fn start_server(config: GuardConfig) -> TestServer {
    start_server_with_users(config, Arc::new(InMemoryUserDirectory::new())).await
}

/// Start the server on an ephemeral port over a given user directory.
pub async fn start_server_with_users(config: GuardConfig, users: Arc<dyn UserDirectory>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::with_users(config, users);
    let state = server.state().clone();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    TestServer {
        addr,
        state,
        client,
        shutdown,
        handle,
    }
}

/// The `kai_session_id=<value>` pair from a response's Set-Cookie headers.
pub fn session_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with("kai_session_id="))
        .map(str::to_string)
}

/// The raw Set-Cookie header for the session cookie.
#[allow(dead_code)]
pub fn raw_session_set_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("kai_session_id="))
        .map(str::to_string)
}
