//! TLS support for encrypted connections.
//!
//! The engine drives TLS without blocking: a [`TlsSession`] wraps a rustls
//! connection and advances the handshake one [`step`](TlsSession::step) per
//! read-readiness event, then carries the record layer for the life of the
//! connection. This module also provides configuration helpers for loading
//! PEM key material and building client/server configs.

mod session;

pub use session::{HandshakeStatus, TlsSession};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::error::{Error, Result};

/// Negotiation direction of a TLS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsRole {
    /// Accepts handshakes; presents the certificate.
    Server,
    /// Initiates handshakes; verifies the peer certificate.
    Client,
}

impl std::fmt::Display for TlsRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsRole::Server => write!(f, "Server"),
            TlsRole::Client => write!(f, "Client"),
        }
    }
}

/// Load a certificate chain from a PEM file.
///
/// # Errors
///
/// Returns [`Error::Tls`] if the file cannot be read or contains no
/// certificates.
pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| Error::Tls(format!("open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Tls(format!("parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load a private key from a PEM file (PKCS#1, PKCS#8, or SEC1).
///
/// # Errors
///
/// Returns [`Error::Tls`] if the file cannot be read or contains no key.
pub fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| Error::Tls(format!("open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("parse {}: {e}", path.display())))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}

/// Build a server configuration from a certificate chain and private key.
///
/// # Errors
///
/// Returns [`Error::Tls`] if the key material is rejected.
pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| Error::Tls(e.to_string()))?;
    Ok(Arc::new(config))
}

/// Build a client configuration trusting the bundled web PKI roots.
#[must_use]
pub fn client_config_with_webpki_roots() -> Arc<ClientConfig> {
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// Build a client configuration trusting exactly the given roots.
///
/// Useful for self-signed deployments and tests.
///
/// # Errors
///
/// Returns [`Error::Tls`] if a root certificate is rejected.
pub fn client_config_with_roots(
    roots: impl IntoIterator<Item = CertificateDer<'static>>,
) -> Result<Arc<ClientConfig>> {
    let mut root_store = RootCertStore::empty();
    for root in roots {
        root_store
            .add(root)
            .map_err(|e| Error::Tls(e.to_string()))?;
    }
    Ok(Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_role_display() {
        assert_eq!(TlsRole::Server.to_string(), "Server");
        assert_eq!(TlsRole::Client.to_string(), "Client");
    }

    #[test]
    fn test_load_certs_and_key_roundtrip() {
        let ck = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let mut cert_file = tempfile::NamedTempFile::new().unwrap();
        cert_file.write_all(ck.cert.pem().as_bytes()).unwrap();
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        key_file
            .write_all(ck.key_pair.serialize_pem().as_bytes())
            .unwrap();

        let certs = load_certs_from_file(cert_file.path()).unwrap();
        assert_eq!(certs.len(), 1);
        let key = load_private_key_from_file(key_file.path()).unwrap();

        assert!(server_config(certs, key).is_ok());
    }

    #[test]
    fn test_load_certs_rejects_empty_file() {
        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_certs_from_file(empty.path()),
            Err(Error::Tls(_))
        ));
    }

    #[test]
    fn test_client_config_with_roots() {
        let ck = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let config = client_config_with_roots(vec![ck.cert.der().clone()]);
        assert!(config.is_ok());
    }
}
