//! Listener lifecycle tests against real sockets.
//!
//! Run with: cargo test --test listeners
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use autotls::{
    new_server_from_manager_and_config, run_listeners, CertificateCache, Error, HttpServer,
    Manager, ServerOptions, Shutdown,
};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn tls_server(addr: SocketAddr, cache_dir: &std::path::Path) -> HttpServer {
    let manager = Manager::new()
        .accept_tos()
        .cache(CertificateCache::open(cache_dir).unwrap());
    let app = Router::new().route("/ping", get(|| async { "pong" }));
    let options = ServerOptions {
        addr,
        grace_period: None,
    };
    new_server_from_manager_and_config(&manager, None, app, options).unwrap()
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn location_of(client: &reqwest::Client, url: String) -> (u16, String) {
    let response = client.get(url).send().await.unwrap();
    let location = response
        .headers()
        .get("location")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    (response.status().as_u16(), location)
}

#[tokio::test]
async fn redirect_listener_serves_until_cancelled() {
    let cache = tempfile::tempdir().unwrap();
    let redirect = HttpServer::redirect(loopback(), 443);
    let tls = tls_server(loopback(), cache.path());
    let token = CancellationToken::new();

    let run = run_listeners(&redirect, &tls, Shutdown::on_cancel(token.clone()));
    let exercise = async {
        let addr = redirect.listening().await.expect("redirect listener should bind");
        tls.listening().await.expect("tls listener should bind");

        let (status, location) =
            location_of(&http_client(), format!("http://{}/foo?x=1", addr)).await;
        assert_eq!(status, 301);
        assert_eq!(location, "https://127.0.0.1/foo?x=1");

        token.cancel();
    };

    let (result, ()) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(run, exercise)
    })
    .await
    .expect("listeners should stop after cancellation");
    result.unwrap();
}

#[tokio::test]
async fn tls_bind_failure_leaves_redirect_running() {
    let cache = tempfile::tempdir().unwrap();
    let occupied = TcpListener::bind(loopback()).unwrap();
    let redirect = HttpServer::redirect(loopback(), 443);
    let tls = tls_server(occupied.local_addr().unwrap(), cache.path());
    let token = CancellationToken::new();

    let run = run_listeners(&redirect, &tls, Shutdown::on_cancel(token.clone()));
    let exercise = async {
        let addr = redirect.listening().await.expect("redirect listener should bind");

        // Give the TLS listener time to fail
        tokio::time::sleep(Duration::from_millis(200)).await;

        let (status, _) = location_of(&http_client(), format!("http://{}/", addr)).await;
        assert_eq!(status, 301);

        token.cancel();
    };

    let (result, ()) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(run, exercise)
    })
    .await
    .expect("listeners should stop after cancellation");

    let err = result.unwrap_err();
    assert!(matches!(err, Error::ListenerStart { listener: "tls", .. }));
    drop(occupied);
}
