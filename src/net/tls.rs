//! TLS client configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::{ConfigError, TlsConfig};

/// Build the TLS connector used for `https` endpoints.
///
/// Trusts the bundled web PKI roots plus every certificate in
/// `ca_file`, when one is configured.
pub fn connector(config: &TlsConfig) -> Result<TlsConnector, ConfigError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(ca_file) = &config.ca_file {
        let added = add_ca_file(&mut roots, Path::new(ca_file))?;
        debug!(ca_file = %ca_file, certificates = added, "Loaded extra CA certificates");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let client = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(client)))
}

fn add_ca_file(roots: &mut RootCertStore, path: &Path) -> Result<usize, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Tls(format!(
            "CA file not found: {}",
            path.display()
        )));
    }

    let file = File::open(path).map_err(ConfigError::Io)?;
    let mut reader = BufReader::new(file);

    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| ConfigError::Tls(format!("{}: {}", path.display(), e)))?;
        roots
            .add(cert)
            .map_err(|e| ConfigError::Tls(format!("{}: {}", path.display(), e)))?;
        added += 1;
    }

    if added == 0 {
        return Err(ConfigError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(added)
}
