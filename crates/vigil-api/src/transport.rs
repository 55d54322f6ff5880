// HTTP client construction.
//
// Only the request/response client is built here. The push stream dials
// through tokio-tungstenite's own rustls roots and ignores `TlsMode`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"));

/// How server certificates are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Platform roots.
    #[default]
    System,
    /// Trust the PEM bundle at this path in addition to the platform roots.
    CustomCa(PathBuf),
    /// No verification. Plant servers with self-signed certificates.
    DangerAcceptInvalid,
}

/// Settings for the HTTP client used by [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// TCP + TLS handshake timeout. Capped by `timeout`.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

fn read_ca(path: &Path) -> Result<reqwest::Certificate, Error> {
    let pem = std::fs::read(path)
        .map_err(|e| Error::Tls(format!("cannot read CA bundle {}: {e}", path.display())))?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| Error::Tls(format!("{} is not a PEM certificate: {e}", path.display())))
}

impl TransportConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout.min(self.timeout));

        let builder = match self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(ref path) => builder.add_root_certificate(read_ca(path)?),
            TlsMode::DangerAcceptInvalid => builder.danger_accept_invalid_certs(true),
        };

        builder
            .build()
            .map_err(|e| Error::Tls(format!("HTTP client setup failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ca_bundle_is_a_tls_error() {
        let cfg = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/nonexistent/vigil-ca.pem")),
            ..TransportConfig::default()
        };
        match cfg.build_client() {
            Err(Error::Tls(msg)) => assert!(msg.contains("vigil-ca.pem")),
            other => panic!("expected Tls error, got: {other:?}"),
        }
    }

    #[test]
    fn system_roots_build() {
        assert!(TransportConfig::with_timeout(Duration::from_secs(2)).build_client().is_ok());
    }
}
