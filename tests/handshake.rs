//! TLS handshakes against a manager-backed configuration, in memory.
use std::sync::Arc;

use autotls::{tls_config_from_manager, CertificateCache, HostPolicy, Manager};
use rustls_pki_types::ServerName;
use tokio_rustls::{TlsAcceptor, TlsConnector};

fn client_connector() -> TlsConnector {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

#[tokio::test]
async fn handshake_for_host_outside_allowlist_is_refused() {
    let cache = tempfile::tempdir().unwrap();
    let manager = Manager::new()
        .accept_tos()
        .host_policy(HostPolicy::allowlist(["a.example", "b.example"]))
        .cache(CertificateCache::open(cache.path()).unwrap());
    let config = tls_config_from_manager(&manager, None).unwrap();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let name = ServerName::try_from("c.example").unwrap();

    let (server, client) = tokio::join!(
        acceptor.accept(server_io),
        client_connector().connect(name, client_io)
    );

    assert!(server.is_err());
    assert!(client.is_err());
    // No issuance was started for the refused host
    assert!(manager.active_hosts().is_empty());
}

#[tokio::test]
async fn handshake_refused_until_terms_accepted() {
    let cache = tempfile::tempdir().unwrap();
    let manager = Manager::new().cache(CertificateCache::open(cache.path()).unwrap());
    let config = tls_config_from_manager(&manager, None).unwrap();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let name = ServerName::try_from("a.example").unwrap();

    let (server, _client) = tokio::join!(
        acceptor.accept(server_io),
        client_connector().connect(name, client_io)
    );

    assert!(server.is_err());
    assert!(manager.active_hosts().is_empty());
}
