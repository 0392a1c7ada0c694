//! autotls: HTTPS with automatic certificates.
//!
//! This is the application entry point. It initializes tracing, loads
//! configuration from a TOML file, builds the certificate manager, and runs
//! the HTTPS listener together with the HTTP->HTTPS redirect until SIGINT or
//! SIGTERM.

use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autotls::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use autotls::http::cancel_on_signal;
use autotls::{
    new_server_from_manager_and_config, run_listeners, CertificateCache, HostPolicy, HttpServer,
    Manager, Shutdown,
};

/// autotls: HTTPS server with automatic Let's Encrypt certificates
#[derive(Parser, Debug)]
#[command(name = "autotls", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "autotls=debug,rustls_acme=info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Domain to obtain a certificate for (repeatable, replaces acme.domains)
    #[arg(short, long = "domain")]
    domains: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = AppConfig::load(&args.config)?;
    if !args.domains.is_empty() {
        config.acme.domains = args.domains;
    }

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Loaded configuration");

    let manager = build_manager(&config);

    let app = Router::new()
        .route("/ping", get(|| async { Json(json!({ "ping": "pong" })) }))
        .layer(TraceLayer::new_for_http());

    let options = config.http.server_options()?;
    let https_port = options.addr.port();
    let tls_server = new_server_from_manager_and_config(&manager, None, app, options)?;
    let redirect_server = HttpServer::redirect(config.http.redirect_addr()?, https_port);

    let token = CancellationToken::new();
    cancel_on_signal(token.clone());

    run_listeners(&redirect_server, &tls_server, Shutdown::on_cancel(token)).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_manager(config: &AppConfig) -> Manager {
    let acme = &config.acme;

    let mut manager = Manager::new()
        .accept_tos()
        .directory_lets_encrypt(acme.production);

    if acme.domains.is_empty() {
        tracing::warn!("No domains configured - certificates will be requested for any host name");
    } else {
        tracing::info!(domains = ?acme.domains, "Restricting certificates to configured domains");
        manager = manager.host_policy(HostPolicy::allowlist(&acme.domains));
    }

    for contact in &acme.contacts {
        manager = manager.contact_push(contact.clone());
    }

    if !acme.production {
        tracing::warn!(
            "Using Let's Encrypt staging environment - certificates will NOT be trusted by browsers. \
             Set acme.production = true for production use."
        );
    }

    // Without an explicit directory the platform cache is attached when the server is built
    if let Some(dir) = &acme.cache_dir {
        match CertificateCache::open(dir) {
            Ok(cache) => manager.set_cache(Some(cache)),
            Err(e) => tracing::warn!(error = %e, "Not using a certificate cache"),
        }
    }

    manager
}
