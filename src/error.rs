use std::io;
use std::path::PathBuf;

/// Errors surfaced by the certificate cache, TLS setup and listener lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cache directory could not be created. Callers treat this as
    /// advisory and keep running without persistent certificates.
    #[error("Certificate cache unavailable at '{}': {source}", path.display())]
    CacheUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{listener} listener failed: {source}")]
    ListenerStart {
        listener: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{listener} listener did not shut down cleanly: {reason}")]
    Shutdown {
        listener: &'static str,
        reason: String,
    },

    #[error("Failed to build TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_unavailable_display_includes_path() {
        let err = Error::CacheUnavailable {
            path: PathBuf::from("/nonexistent/golang-autocert"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "Certificate cache unavailable at '/nonexistent/golang-autocert': denied"
        );
    }

    #[test]
    fn test_listener_start_display() {
        let err = Error::ListenerStart {
            listener: "tls",
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(err.to_string(), "tls listener failed: address in use");
    }
}
