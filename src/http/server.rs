//! Listener handles.
//!
//! A [`Listener`] is started with `serve`, which runs until the listener stops
//! or fails, and stopped with `shutdown`, which requests a graceful stop and
//! waits for it. [`HttpServer`] implements it on top of axum-server, with
//! optional TLS.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls::ServerConfig;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::manager::Manager;
use crate::tls::tls_config_from_manager;

use super::redirect::redirect_router;

/// Conventional plaintext HTTP port
pub const HTTP_PORT: u16 = 80;

/// Conventional HTTPS port
pub const HTTPS_PORT: u16 = 443;

/// Wildcard address on `port`.
///
/// `[::]` accepts IPv4 connections too on dual-stack hosts (the default on
/// Linux, macOS and Windows), matching an empty host in Go's `":http"`.
pub fn unspecified_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))
}

/// A network listener with a blocking start and a blocking graceful stop.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Accept connections until the listener is shut down or fails.
    async fn serve(&self) -> Result<()>;

    /// Stop accepting connections and wait for in-flight requests to finish.
    async fn shutdown(&self) -> Result<()>;
}

/// Options for the HTTPS listener.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: SocketAddr,
    /// Deadline for in-flight requests on shutdown; `None` waits indefinitely
    pub grace_period: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            addr: unspecified_addr(HTTPS_PORT),
            grace_period: None,
        }
    }
}

/// axum-server backed listener.
///
/// Single use: once stopped it cannot be served again.
pub struct HttpServer {
    name: &'static str,
    addr: SocketAddr,
    router: Router,
    tls: Option<RustlsConfig>,
    handle: Handle,
    grace_period: Option<Duration>,
    stopped: watch::Sender<bool>,
}

impl HttpServer {
    /// Plain HTTP listener.
    pub fn plain(name: &'static str, addr: SocketAddr, router: Router) -> Self {
        Self::build(name, addr, router, None)
    }

    /// HTTPS listener using a pre-built rustls configuration.
    pub fn tls(addr: SocketAddr, router: Router, config: ServerConfig) -> Self {
        let tls = RustlsConfig::from_config(Arc::new(config));
        Self::build("tls", addr, router, Some(tls))
    }

    /// Plain HTTP listener redirecting everything to `https_port`.
    pub fn redirect(addr: SocketAddr, https_port: u16) -> Self {
        Self::plain("redirect", addr, redirect_router(https_port))
    }

    fn build(
        name: &'static str,
        addr: SocketAddr,
        router: Router,
        tls: Option<RustlsConfig>,
    ) -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            name,
            addr,
            router,
            tls,
            handle: Handle::new(),
            grace_period: None,
            stopped,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Option<Duration>) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Configured bind address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait until the listener is bound and return the actual address, or
    /// `None` if it failed to bind.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }
}

#[async_trait]
impl Listener for HttpServer {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn serve(&self) -> Result<()> {
        tracing::info!(
            listener = self.name,
            addr = %self.addr,
            tls = self.tls.is_some(),
            "Starting listener"
        );

        let app = self.router.clone().into_make_service();
        let result = match &self.tls {
            Some(tls) => {
                axum_server::bind_rustls(self.addr, tls.clone())
                    .handle(self.handle.clone())
                    .serve(app)
                    .await
            }
            None => {
                axum_server::bind(self.addr)
                    .handle(self.handle.clone())
                    .serve(app)
                    .await
            }
        };
        self.stopped.send_replace(true);

        match result {
            Ok(()) => {
                tracing::debug!(listener = self.name, "Listener stopped");
                Ok(())
            }
            Err(source) => {
                tracing::error!(listener = self.name, error = %source, "Listener failed");
                Err(Error::ListenerStart {
                    listener: self.name,
                    source,
                })
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!(
            listener = self.name,
            grace_period = ?self.grace_period,
            "Graceful shutdown initiated"
        );
        self.handle.graceful_shutdown(self.grace_period);

        let mut stopped = self.stopped.subscribe();
        stopped
            .wait_for(|stopped| *stopped)
            .await
            .map(|_| ())
            .map_err(|e| Error::Shutdown {
                listener: self.name,
                reason: e.to_string(),
            })
    }
}

/// Build the HTTPS listener from a caller-supplied manager and optional
/// rustls configuration.
///
/// The configuration's certificate resolver and ALPN list are always replaced
/// by the manager's; the manager gets the default cache if it has none.
pub fn new_server_from_manager_and_config(
    manager: &Manager,
    config: Option<ServerConfig>,
    router: Router,
    options: ServerOptions,
) -> Result<HttpServer> {
    let config = tls_config_from_manager(manager, config)?;
    Ok(HttpServer::tls(options.addr, router, config).with_grace_period(options.grace_period))
}
