//! TLS certificate loading for the HTTPS listener.

use std::io;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

fn require_file(path: &Path, what: &str) -> io::Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{what} file not found: {}", path.display()),
        ))
    }
}

/// Load a rustls config from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> io::Result<RustlsConfig> {
    require_file(cert_path, "Certificate")?;
    require_file(key_path, "Private key")?;
    RustlsConfig::from_pem_file(cert_path, key_path).await
}
