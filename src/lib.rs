//! autotls - automatic Let's Encrypt certificates for axum servers
//!
//! Runs an HTTPS listener whose certificates are issued and renewed on demand
//! through ACME, next to a plain HTTP listener redirecting to it, and shuts
//! both down gracefully together.
//!
//! ```no_run
//! use autotls::http::{unspecified_addr, HTTPS_PORT};
//! use autotls::{new_tls_config, run, HttpServer, Shutdown};
//! use axum::{routing::get, Router};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn serve() -> Result<(), autotls::Error> {
//! let config = new_tls_config(["example1.com", "example2.com"])?;
//! let app = Router::new().route("/ping", get(|| async { "pong" }));
//! let server = HttpServer::tls(unspecified_addr(HTTPS_PORT), app, config);
//!
//! let token = CancellationToken::new();
//! autotls::http::cancel_on_signal(token.clone());
//! run(Shutdown::on_cancel(token), &server).await
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod manager;
pub mod runner;
pub mod tls;

pub use cache::{cache_handle, resolve_cache_dir, CertificateCache};
pub use error::*;
pub use http::{new_server_from_manager_and_config, HttpServer, Listener, ServerOptions};
pub use manager::{HostPolicy, Manager};
pub use runner::{run, run_listeners, run_with_default_context, Shutdown, ShutdownOwner};
pub use tls::{new_tls_config, tls_config_from_manager};
