//! Credential storage for the session token pair
//!
//! A `CredentialStore` holds at most one `CredentialPair`: the store instance
//! *is* the execution context's credential scope. `MemoryStore` backs a
//! long-lived interactive client; `FileStore` persists the pair to a JSON file
//! with atomic temp-file + rename writes so it survives restarts. Per-request
//! stores (cookie jars) live in the proxy service.
//!
//! Every write carries a TTL. Stores record it as an absolute unix millisecond
//! timestamp and report an expired pair as absent.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `CredentialStore` methods.
///
/// `Pin<Box<dyn Future>>` keeps the trait dyn-compatible (`Arc<dyn CredentialStore>`).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The access/refresh credential pair.
///
/// Immutable once built: a refresh replaces the whole pair, never one half.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived bearer token attached to API requests
    pub access_token: String,
    /// Longer-lived token used only against the renewal endpoint
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// `Authorization` header value for the access token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Persistence contract for one execution context's credential pair.
///
/// `read` never fails: anything unreadable or expired is "no session".
/// `write` replaces the stored pair atomically from the point of view of
/// later reads. `clear` is idempotent.
pub trait CredentialStore: Send + Sync {
    fn read(&self) -> StoreFuture<'_, Option<CredentialPair>>;

    fn write(&self, pair: CredentialPair, ttl: Duration) -> StoreFuture<'_, Result<()>>;

    fn clear(&self) -> StoreFuture<'_, Result<()>>;
}

/// A pair plus its absolute expiry, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(flatten)]
    pair: CredentialPair,
    /// Expiration as unix timestamp in milliseconds
    expires: u64,
}

impl StoredCredential {
    fn new(pair: CredentialPair, ttl: Duration) -> Self {
        Self {
            pair,
            expires: now_millis().saturating_add(ttl.as_millis() as u64),
        }
    }

    fn live(&self) -> Option<CredentialPair> {
        (self.expires > now_millis()).then(|| self.pair.clone())
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// In-process store for a long-lived client.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<StoredCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing pair (e.g. restored from elsewhere).
    pub fn with_pair(pair: CredentialPair, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(Some(StoredCredential::new(pair, ttl))),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn read(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        Box::pin(async move { self.state.lock().await.as_ref().and_then(StoredCredential::live) })
    }

    fn write(&self, pair: CredentialPair, ttl: Duration) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await = Some(StoredCredential::new(pair, ttl));
            debug!(ttl_secs = ttl.as_secs(), "stored credential pair");
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.state.lock().await.take().is_some() {
                debug!("cleared credential pair");
            }
            Ok(())
        })
    }
}

/// File-backed store.
///
/// The Mutex serializes writes; reads clone the in-memory copy so request-time
/// reads never touch the disk.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<Option<StoredCredential>>,
}

impl FileStore {
    /// Load the pair from `path`.
    ///
    /// A missing file is a cold start with no session. A file that exists but
    /// does not parse is an error, so a corrupted store is noticed rather than
    /// silently signing the user out.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let stored: StoredCredential = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), "loaded stored session");
            Some(stored)
        } else {
            info!(path = %path.display(), "credential file not found, starting without a session");
            None
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileStore {
    fn read(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        Box::pin(async move { self.state.lock().await.as_ref().and_then(StoredCredential::live) })
    }

    fn write(&self, pair: CredentialPair, ttl: Duration) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let stored = StoredCredential::new(pair, ttl);
            write_atomic(&self.path, &stored).await?;
            *state = Some(stored);
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => debug!(path = %self.path.display(), "removed credential file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(format!("removing credential file: {e}"))),
            }
            *state = None;
            Ok(())
        })
    }
}

/// Write the stored pair to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 since the file holds tokens.
async fn write_atomic(path: &Path, data: &StoredCredential) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential pair");
    Ok(())
}
