//! Coordinated lifecycle of the redirect and HTTPS listeners.
//!
//! ```text
//! Idle ──run──▶ Running ──token cancelled──▶ ShuttingDown ──both stopped──▶ Stopped
//! ```
//!
//! Three units of work run concurrently on the calling task: the redirect
//! listener, the HTTPS listener and a shutdown watcher. `run_listeners` waits
//! for all three. A failure in one does not cancel the others, and the first
//! error in start order (redirect, HTTPS, shutdown) is returned.
//!
//! Graceful shutdown has no deadline unless the listeners carry their own
//! grace period; callers wanting a bound must arrange it upstream.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::http::{unspecified_addr, HttpServer, Listener, HTTP_PORT};

/// Who is responsible for stopping the listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOwner {
    /// The runner shuts both listeners down when the token is cancelled.
    Runner,
    /// The caller stops the listeners itself; the token is ignored.
    Caller,
}

/// Shutdown trigger passed to [`run`].
#[derive(Debug, Clone)]
pub struct Shutdown {
    token: CancellationToken,
    owner: ShutdownOwner,
}

impl Shutdown {
    /// Shut both listeners down once `token` is cancelled.
    pub fn on_cancel(token: CancellationToken) -> Self {
        Self {
            token,
            owner: ShutdownOwner::Runner,
        }
    }

    /// Never initiate shutdown; the caller stops the listeners by other means.
    pub fn caller_managed(token: CancellationToken) -> Self {
        Self {
            token,
            owner: ShutdownOwner::Caller,
        }
    }

    pub fn owner(&self) -> ShutdownOwner {
        self.owner
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Run `redirect` and `tls` until both have stopped.
pub async fn run_listeners<R, T>(redirect: &R, tls: &T, shutdown: Shutdown) -> Result<()>
where
    R: Listener + ?Sized,
    T: Listener + ?Sized,
{
    tracing::info!(
        redirect = redirect.name(),
        tls = tls.name(),
        shutdown_owner = ?shutdown.owner,
        "Running listeners"
    );

    let watcher = async {
        if shutdown.owner == ShutdownOwner::Caller {
            return Ok(());
        }

        shutdown.token.cancelled().await;
        tracing::info!("Shutdown requested, stopping listeners");

        let (redirect_stopped, tls_stopped) = tokio::join!(redirect.shutdown(), tls.shutdown());
        redirect_stopped.and(tls_stopped)
    };

    let (redirect_result, tls_result, shutdown_result) =
        tokio::join!(redirect.serve(), tls.serve(), watcher);

    let result = redirect_result.and(tls_result).and(shutdown_result);
    match &result {
        Ok(()) => tracing::info!("Listeners stopped"),
        Err(e) => tracing::error!(error = %e, "Listeners stopped with error"),
    }
    result
}

/// Serve `tls` alongside a redirect listener on `[::]:80`, shutting both
/// down according to `shutdown`.
pub async fn run(shutdown: Shutdown, tls: &HttpServer) -> Result<()> {
    let redirect = HttpServer::redirect(unspecified_addr(HTTP_PORT), tls.addr().port());
    run_listeners(&redirect, tls, shutdown).await
}

/// Like [`run`], but the runner never shuts the listeners down.
pub async fn run_with_default_context(tls: &HttpServer) -> Result<()> {
    run(Shutdown::caller_managed(CancellationToken::new()), tls).await
}
