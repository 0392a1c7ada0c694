//! TLS configuration backed by an ACME certificate manager.
//!
//! Two entry points:
//! - [`new_tls_config`] builds a manager that accepts the CA's terms, limits
//!   issuance to the given domains (any domain when empty) and persists
//!   certificates in the default cache directory.
//! - [`tls_config_from_manager`] starts from a caller-built manager and an
//!   optional caller-built `ServerConfig`.
//!
//! In both cases the certificate resolver and the ALPN list always come from
//! the manager. Whatever the caller put in those two fields is replaced, since
//! only the manager can answer handshakes with issued certificates and
//! `acme-tls/1` challenges.

use rustls::ServerConfig;

use crate::cache::{cache_handle, CertificateCache};
use crate::error::Result;
use crate::manager::{HostPolicy, Manager};

/// Build a TLS configuration that obtains certificates for `domains`.
///
/// An empty list accepts any server name a client presents.
pub fn new_tls_config<I, S>(domains: I) -> Result<ServerConfig>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    manager_for_domains(domains).tls_config()
}

/// Manager used by [`new_tls_config`]: terms accepted, host policy from
/// `domains`, default cache directory when it can be created.
pub fn manager_for_domains<I, S>(domains: I) -> Manager
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    manager_for_domains_with(domains, cache_handle())
}

/// Like [`manager_for_domains`], with an already resolved cache. A cache
/// error is logged and the manager runs without one.
pub fn manager_for_domains_with<I, S>(domains: I, cache: Result<CertificateCache>) -> Manager
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let domains: Vec<S> = domains.into_iter().collect();
    let mut manager = Manager::new().accept_tos();
    if !domains.is_empty() {
        manager = manager.host_policy(HostPolicy::allowlist(domains));
    }
    attach_cache(&manager, cache);
    manager
}

/// Give `manager` a cache unless it already has one.
///
/// A cache that cannot be created is logged and skipped; the manager still
/// works but requests a new certificate on every start.
pub fn ensure_cache(manager: &Manager) {
    if !manager.has_cache() {
        attach_cache(manager, cache_handle());
    }
}

fn attach_cache(manager: &Manager, cache: Result<CertificateCache>) {
    match cache {
        Ok(cache) => {
            tracing::debug!(path = %cache.path().display(), "Using certificate cache");
            manager.set_cache(Some(cache));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Not using a certificate cache");
        }
    }
}

/// Overwrite the certificate resolver and ALPN protocols of `config` with the
/// manager's. Always overwrites, even when the caller set its own values.
pub fn apply_manager_defaults(manager: &Manager, config: &mut ServerConfig) {
    config.cert_resolver = manager.cert_resolver();
    config.alpn_protocols = manager.alpn_protocols();
}

/// Derive a TLS configuration from a caller-supplied manager and, optionally,
/// a caller-supplied configuration whose other settings are kept.
pub fn tls_config_from_manager(
    manager: &Manager,
    config: Option<ServerConfig>,
) -> Result<ServerConfig> {
    ensure_cache(manager);

    let mut config = match config {
        Some(config) => config,
        None => manager.tls_config()?,
    };
    apply_manager_defaults(manager, &mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::manager::Refusal;
    use std::sync::Arc;

    use rustls::server::{ClientHello, ResolvesServerCert};
    use rustls::sign::CertifiedKey;

    #[derive(Debug)]
    struct PlaceholderResolver;

    impl ResolvesServerCert for PlaceholderResolver {
        fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
            None
        }
    }

    fn placeholder_config() -> ServerConfig {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(PlaceholderResolver));
        config.alpn_protocols = vec![b"placeholder".to_vec()];
        config.max_early_data_size = 4096;
        config
    }

    #[test]
    fn test_apply_manager_defaults_overwrites_caller_values() {
        let manager = Manager::new().accept_tos();
        let placeholder = Arc::new(PlaceholderResolver) as Arc<dyn ResolvesServerCert>;
        let mut config = placeholder_config();
        config.cert_resolver = placeholder.clone();

        apply_manager_defaults(&manager, &mut config);

        let fresh = manager.tls_config().unwrap();
        assert!(!Arc::ptr_eq(&config.cert_resolver, &placeholder));
        assert!(Arc::ptr_eq(&config.cert_resolver, &fresh.cert_resolver));
        assert_eq!(config.alpn_protocols, fresh.alpn_protocols);
    }

    #[test]
    fn test_override_keeps_unrelated_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Manager::new()
            .accept_tos()
            .cache(CertificateCache::open(tmp.path()).unwrap());

        let config = tls_config_from_manager(&manager, Some(placeholder_config())).unwrap();

        assert_eq!(config.max_early_data_size, 4096);
        assert!(Arc::ptr_eq(&config.cert_resolver, &manager.cert_resolver()));
        assert!(!config.alpn_protocols.contains(&b"placeholder".to_vec()));
    }

    #[test]
    fn test_without_override_derives_from_manager() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Manager::new()
            .accept_tos()
            .cache(CertificateCache::open(tmp.path()).unwrap());

        let config = tls_config_from_manager(&manager, None).unwrap();

        assert!(Arc::ptr_eq(&config.cert_resolver, &manager.cert_resolver()));
        assert_eq!(config.alpn_protocols, manager.alpn_protocols());
    }

    #[test]
    fn test_existing_cache_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CertificateCache::open(tmp.path().join("certs")).unwrap();
        let manager = Manager::new().cache(cache);

        ensure_cache(&manager);

        assert!(manager.has_cache());
        assert!(tmp.path().join("certs").is_dir());
    }

    #[test]
    fn test_attach_cache_failure_leaves_manager_usable() {
        let manager = Manager::new().accept_tos();
        let failure = Err(Error::CacheUnavailable {
            path: "/proc/forbidden".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });

        attach_cache(&manager, failure);

        assert!(!manager.has_cache());
        assert!(manager.tls_config().is_ok());
    }

    #[test]
    fn test_manager_for_no_domains_accepts_any_name() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CertificateCache::open(tmp.path());
        let manager = manager_for_domains_with(Vec::<String>::new(), cache);
        assert!(manager.tos_accepted());
        assert!(manager.has_cache());
        assert_eq!(
            manager.authorize(Some("whatever.example")),
            Ok("whatever.example".to_string())
        );
    }

    #[test]
    fn test_manager_for_domains_restricts_names() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CertificateCache::open(tmp.path());
        let manager = manager_for_domains_with(["a.example", "b.example"], cache);
        assert!(manager.authorize(Some("a.example")).is_ok());
        assert!(manager.authorize(Some("b.example")).is_ok());
        assert_eq!(
            manager.authorize(Some("c.example")),
            Err(Refusal::HostNotAllowed("c.example".to_string()))
        );
    }

    #[test]
    fn test_domains_config_advertises_acme_alpn() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CertificateCache::open(tmp.path());
        let config = manager_for_domains_with(["a.example"], cache)
            .tls_config()
            .unwrap();
        assert!(config.alpn_protocols.contains(&b"acme-tls/1".to_vec()));
        assert!(config.alpn_protocols.contains(&b"h2".to_vec()));
    }
}
