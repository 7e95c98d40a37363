//! TLS setup for PostgreSQL connections.
//!
//! The mode comes from the connection string's `sslmode`. Anything other than
//! `disable` negotiates TLS and verifies the server certificate against the
//! webpki root store.

use rustls::ClientConfig;
use tokio_postgres::config::SslMode;
use tokio_postgres::Config as PgConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

/// Builder for PostgreSQL TLS connectors.
pub struct TlsBuilder {
    ssl_mode: SslMode,
}

impl TlsBuilder {
    pub fn new(ssl_mode: SslMode) -> Self {
        Self { ssl_mode }
    }

    pub fn for_config(config: &PgConfig) -> Self {
        Self::new(config.get_ssl_mode())
    }

    /// Check if this mode requires TLS.
    pub fn requires_tls(&self) -> bool {
        !matches!(self.ssl_mode, SslMode::Disable)
    }

    /// Connector for deadpool-postgres, or `None` when TLS is disabled.
    pub fn build(&self) -> Option<MakeRustlsConnect> {
        if !self.requires_tls() {
            warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
            return None;
        }
        debug!("PostgreSQL TLS enabled ({:?}) with certificate verification", self.ssl_mode);
        Some(MakeRustlsConnect::new(Self::client_config()))
    }

    fn client_config() -> ClientConfig {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    }
}
