//! Certificate manager.
//!
//! Wraps `rustls-acme` behind the small surface the rest of the crate needs:
//! terms-of-service acceptance, a host policy, an optional on-disk cache, and
//! a rustls `ServerConfig` whose certificate resolver issues and renews
//! certificates on demand.
//!
//! Issuance is started lazily. The first TLS handshake naming an accepted
//! host spawns an ACME state machine for that host on the current tokio
//! runtime; until a certificate is available the handshake is answered with
//! no certificate (except for `acme-tls/1` challenge handshakes, which the
//! per-host resolver answers itself).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::StreamExt;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use rustls_acme::{AcmeConfig, ResolvesServerCertAcme};

use crate::cache::CertificateCache;
use crate::error::Result;

/// ALPN identifier of the tls-alpn-01 challenge
pub const ACME_TLS_ALPN_NAME: &[u8] = b"acme-tls/1";

/// Which server names the manager will obtain certificates for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostPolicy {
    /// Any name presented in a handshake. The CA will issue for whatever a
    /// client asks, so this is only safe behind something that filters SNI.
    /// Each distinct name also gets its own ACME task and resolver entry that
    /// live as long as the manager, so memory and background tasks grow with
    /// the number of names clients send.
    #[default]
    AcceptAny,
    /// Exactly these names (compared case-insensitively, trailing dot ignored).
    Allowlist(HashSet<String>),
}

impl HostPolicy {
    pub fn allowlist<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        HostPolicy::Allowlist(
            hosts
                .into_iter()
                .map(|h| normalize_host(h.as_ref()))
                .collect(),
        )
    }

    pub fn allows(&self, host: &str) -> bool {
        match self {
            HostPolicy::AcceptAny => true,
            HostPolicy::Allowlist(hosts) => hosts.contains(&normalize_host(host)),
        }
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Reason a handshake was refused before any issuance was attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("client did not send a server name")]
    MissingServerName,
    #[error("host {0:?} is not allowed by the host policy")]
    HostNotAllowed(String),
    #[error("terms of service have not been accepted")]
    TermsNotAccepted,
}

#[derive(Debug, Default)]
struct Settings {
    accept_tos: bool,
    host_policy: HostPolicy,
    cache: Option<CertificateCache>,
    contacts: Vec<String>,
    production: bool,
}

#[derive(Debug, Default)]
struct Inner {
    settings: RwLock<Settings>,
    /// Per-host resolvers backed by a running ACME state machine
    issuers: Mutex<HashMap<String, Arc<ResolvesServerCertAcme>>>,
}

/// ACME certificate manager.
///
/// Cheap to clone; clones share settings and issued certificates. Every
/// `ServerConfig` derived from a manager points at the same resolver.
#[derive(Debug, Clone, Default)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agree to the CA's terms of service without prompting.
    pub fn accept_tos(self) -> Self {
        self.inner.write_settings().accept_tos = true;
        self
    }

    pub fn host_policy(self, policy: HostPolicy) -> Self {
        self.inner.write_settings().host_policy = policy;
        self
    }

    pub fn cache(self, cache: CertificateCache) -> Self {
        self.set_cache(Some(cache));
        self
    }

    /// Add an account contact; bare addresses get a `mailto:` prefix.
    pub fn contact_push(self, contact: impl Into<String>) -> Self {
        let contact = contact.into();
        let contact = if contact.contains(':') {
            contact
        } else {
            format!("mailto:{}", contact)
        };
        self.inner.write_settings().contacts.push(contact);
        self
    }

    /// Use the Let's Encrypt production directory instead of staging.
    pub fn directory_lets_encrypt(self, production: bool) -> Self {
        self.inner.write_settings().production = production;
        self
    }

    /// Replace the cache. Only affects hosts whose issuance has not started yet.
    pub fn set_cache(&self, cache: Option<CertificateCache>) {
        self.inner.write_settings().cache = cache;
    }

    pub fn has_cache(&self) -> bool {
        self.inner.read_settings().cache.is_some()
    }

    pub fn tos_accepted(&self) -> bool {
        self.inner.read_settings().accept_tos
    }

    /// Decide whether a handshake for `server_name` may be served, returning
    /// the normalized host name.
    pub fn authorize(&self, server_name: Option<&str>) -> Result<String, Refusal> {
        self.inner.authorize(server_name)
    }

    /// Hosts for which issuance has been started.
    pub fn active_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.inner.lock_issuers().keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// The certificate-retrieval callback shared by every derived config.
    pub fn cert_resolver(&self) -> Arc<dyn ResolvesServerCert> {
        self.inner.clone()
    }

    /// Protocols advertised via ALPN, including the ACME challenge protocol.
    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![
            b"h2".to_vec(),
            b"http/1.1".to_vec(),
            ACME_TLS_ALPN_NAME.to_vec(),
        ]
    }

    /// Build a fresh rustls server configuration served by this manager.
    pub fn tls_config(&self) -> Result<ServerConfig> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_cert_resolver(self.cert_resolver());
        config.alpn_protocols = self.alpn_protocols();
        Ok(config)
    }
}

impl Inner {
    fn read_settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_settings(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_issuers(&self) -> MutexGuard<'_, HashMap<String, Arc<ResolvesServerCertAcme>>> {
        self.issuers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorize(&self, server_name: Option<&str>) -> Result<String, Refusal> {
        let host = server_name
            .map(normalize_host)
            .filter(|h| !h.is_empty())
            .ok_or(Refusal::MissingServerName)?;

        let settings = self.read_settings();
        if !settings.host_policy.allows(&host) {
            return Err(Refusal::HostNotAllowed(host));
        }
        if !settings.accept_tos {
            return Err(Refusal::TermsNotAccepted);
        }
        Ok(host)
    }

    /// Resolver for `host`, starting issuance on first use.
    fn issuer(&self, host: &str) -> Option<Arc<ResolvesServerCertAcme>> {
        let mut issuers = self.lock_issuers();
        if let Some(resolver) = issuers.get(host) {
            return Some(resolver.clone());
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(%host, error = %e, "No async runtime, cannot start certificate issuance");
                return None;
            }
        };

        let (mut acme_state, env_name) = {
            let settings = self.read_settings();
            let config = settings
                .contacts
                .iter()
                .fold(AcmeConfig::new([host]), |config, contact| {
                    config.contact_push(contact)
                })
                .cache_option(settings.cache.as_ref().map(CertificateCache::acme_cache))
                .directory_lets_encrypt(settings.production);
            let env_name = if settings.production { "production" } else { "staging" };
            (config.state(), env_name)
        };

        tracing::info!(%host, environment = %env_name, "Starting certificate issuance");

        let resolver = acme_state.resolver();
        let task_host = host.to_string();
        runtime.spawn(async move {
            loop {
                match acme_state.next().await {
                    Some(Ok(event)) => {
                        tracing::info!(host = %task_host, event = ?event, "ACME event");
                    }
                    Some(Err(err)) => {
                        tracing::error!(host = %task_host, error = %err, "ACME error");
                    }
                    None => {
                        tracing::debug!(host = %task_host, "ACME state stream ended");
                        break;
                    }
                }
            }
        });

        issuers.insert(host.to_string(), resolver.clone());
        Some(resolver)
    }
}

impl ResolvesServerCert for Inner {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let host = match self.authorize(client_hello.server_name()) {
            Ok(host) => host,
            Err(refusal) => {
                tracing::warn!(%refusal, "Refusing TLS handshake");
                return None;
            }
        };

        self.issuer(&host)?.resolve(client_hello)
    }
}
