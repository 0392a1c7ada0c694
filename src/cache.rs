//! Certificate cache location.
//!
//! Resolves a per-user directory for issued certificates, account keys and
//! their metadata, and creates it with owner-only permissions. The directory
//! name matches the one used by Go's `autocert`, so a server migrated from Go
//! keeps its existing certificates.
//!
//! Resolution order:
//! - macOS: `$HOME/Library/Caches/golang-autocert`
//! - Windows: first non-empty of `APPDATA`, `CSIDL_APPDATA`, `TEMP`, `TMP`,
//!   otherwise `%HOMEDRIVE%%HOMEPATH%/golang-autocert`
//! - everything else: `$XDG_CACHE_HOME/golang-autocert`, otherwise
//!   `$HOME/.cache/golang-autocert`

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

use rustls_acme::caches::DirCache;

use crate::error::{Error, Result};

/// Directory name appended to the platform cache root
pub const CACHE_DIR_NAME: &str = "golang-autocert";

/// Windows variables tried in order for the cache root
const WINDOWS_CACHE_VARS: [&str; 4] = ["APPDATA", "CSIDL_APPDATA", "TEMP", "TMP"];

/// Operating system family, as far as cache placement is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Other,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// Resolve the cache directory for `platform`, reading variables through `env`.
///
/// Pure: no filesystem access, and empty variables count as unset.
pub fn resolve_cache_dir_for<F>(platform: Platform, env: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| env(name).filter(|v| !v.is_empty());

    match platform {
        Platform::MacOs => home_dir(platform, &var)
            .join("Library")
            .join("Caches")
            .join(CACHE_DIR_NAME),
        Platform::Windows => WINDOWS_CACHE_VARS
            .iter()
            .find_map(|name| var(*name))
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir(platform, &var))
            .join(CACHE_DIR_NAME),
        Platform::Other => match var("XDG_CACHE_HOME") {
            Some(xdg) => PathBuf::from(xdg).join(CACHE_DIR_NAME),
            None => home_dir(platform, &var).join(".cache").join(CACHE_DIR_NAME),
        },
    }
}

/// Resolve the cache directory for the running OS and process environment.
pub fn resolve_cache_dir() -> PathBuf {
    resolve_cache_dir_for(Platform::current(), |name| std::env::var(name).ok())
}

fn home_dir<F>(platform: Platform, var: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match platform {
        // Plain concatenation: HOMEPATH already starts with a separator.
        Platform::Windows => PathBuf::from(format!(
            "{}{}",
            var("HOMEDRIVE").unwrap_or_default(),
            var("HOMEPATH").unwrap_or_default()
        )),
        _ => var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/")),
    }
}

/// Handle to a directory holding issued certificates and ACME account keys.
///
/// The entries themselves are written by the issuance layer; this type only
/// guarantees the directory exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateCache {
    dir: PathBuf,
}

impl CertificateCache {
    /// Open `dir`, creating it and any missing parents with mode 0700.
    ///
    /// An existing directory is used as-is; its permissions are not touched.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        builder.create(&dir).map_err(|source| Error::CacheUnavailable {
            path: dir.clone(),
            source,
        })?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Key/value store used by `rustls-acme` for certificates and accounts.
    pub fn acme_cache(&self) -> DirCache<PathBuf> {
        DirCache::new(self.dir.clone())
    }
}

/// Resolve the default cache directory and make sure it exists.
///
/// Failure is advisory: callers log it and carry on without a cache, which
/// means a fresh certificate is requested on every process start.
pub fn cache_handle() -> Result<CertificateCache> {
    CertificateCache::open(resolve_cache_dir())
}
