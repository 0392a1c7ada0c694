//! HTTP to HTTPS redirect.
//!
//! Every request, whatever its path or method, gets a `301 Moved Permanently`
//! pointing at the same host, path and query under `https://`. A request whose
//! host cannot be determined is still redirected, with an empty host.

use axum::extract::{FromRequestParts, Request};
use axum::http::{header, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use axum_extra::extract::Host;

/// Router for the plaintext listener.
pub fn redirect_router(https_port: u16) -> Router {
    Router::new().fallback(any(move |request: Request| async move {
        let (mut parts, _body) = request.into_parts();
        let host = match Host::from_request_parts(&mut parts, &()).await {
            Ok(Host(host)) => host,
            Err(e) => {
                tracing::debug!(error = %e, uri = %parts.uri, "Request without a resolvable host");
                String::new()
            }
        };
        redirect_to_https(&host, &parts.uri, https_port)
    }))
}

fn redirect_to_https(host: &str, uri: &Uri, https_port: u16) -> impl IntoResponse {
    let location = https_location(host, uri, https_port);
    tracing::debug!(from = %uri, to = %location, "Redirecting HTTP to HTTPS");
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)])
}

/// Target URL for a plaintext request.
///
/// Any port on `host` is dropped; the HTTPS port is only spelled out when it
/// is not 443.
pub fn https_location(host: &str, uri: &Uri, https_port: u16) -> String {
    let host = strip_port(host);
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if https_port == 443 {
        format!("https://{}{}", host, path_and_query)
    } else {
        format!("https://{}:{}{}", host, https_port, path_and_query)
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal, keep the brackets
        return host.find(']').map(|end| &host[..=end]).unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}
