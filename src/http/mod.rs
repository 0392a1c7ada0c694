//! HTTP listeners.
//!
//! - **redirect**: plain HTTP listener answering every request with a 301 to
//!   the same host and path under `https://`
//! - **server**: the [`Listener`] contract and its axum-server implementation,
//!   for both the redirect listener and the ACME-backed HTTPS listener
//! - **shutdown**: OS signal wiring that cancels a shutdown token

mod redirect;
mod server;
mod shutdown;

pub use redirect::{https_location, redirect_router};
pub use server::{
    new_server_from_manager_and_config, unspecified_addr, HttpServer, Listener, ServerOptions,
    HTTPS_PORT, HTTP_PORT,
};
pub use shutdown::cancel_on_signal;
