//! Persisted per-credential quota counters
//!
//! Thin wrapper over a JSON ledger file: read, increment, and set operations
//! for each credential's quota usage and last-used timestamp. No selection
//! policy lives here; that is the rotator's job.
//!
//! All writes go through atomic temp-file + rename to prevent corruption on
//! crash, and a tokio Mutex serializes writers, which makes
//! `increment_quota` an atomic read-modify-write rather than a lost-update
//! hazard. The file keeps catalog order: the rotator's tie-breaking depends
//! on it.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A single API key record.
///
/// `last_used_at` is a unix timestamp in milliseconds, set every time usage
/// is reported against the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub name: String,
    pub secret: Secret<String>,
    pub enabled: bool,
    pub quota_used: u64,
    #[serde(default)]
    pub last_used_at: Option<u64>,
}

impl Credential {
    /// Whether the rotator may hand this credential out.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.quota_used < crate::QUOTA_CEILING
    }
}

/// Thread-safe ledger file manager.
///
/// The Mutex serializes all access; reads clone the in-memory state so
/// callers never hold the lock across their own awaits.
pub struct QuotaLedger {
    path: PathBuf,
    state: Mutex<Vec<Credential>>,
}

impl QuotaLedger {
    /// Load the ledger from the given file path.
    ///
    /// If the file doesn't exist, creates it as an empty list (cold start
    /// with zero keys). The rotator will report pool-exhausted until an
    /// admin adds a key.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Ledger(format!("reading ledger file: {e}")))?;
            let credentials: Vec<Credential> = serde_json::from_str(&contents)
                .map_err(|e| Error::Ledger(format!("parsing ledger file: {e}")))?;
            info!(path = %path.display(), keys = credentials.len(), "loaded credential ledger");
            credentials
        } else {
            info!(path = %path.display(), "ledger file not found, starting empty");
            let empty = Vec::new();
            write_atomic(&path, &empty).await?;
            empty
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Snapshot of all credentials in catalog order.
    pub async fn list(&self) -> Vec<Credential> {
        self.state.lock().await.clone()
    }

    /// Get a clone of one credential.
    pub async fn get(&self, id: Uuid) -> Option<Credential> {
        let state = self.state.lock().await;
        state.iter().find(|c| c.id == id).cloned()
    }

    /// Add a credential, or replace it in place if the id already exists
    /// (keeping its catalog position). Persists to disk.
    pub async fn insert(&self, credential: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.iter().position(|c| c.id == credential.id) {
            Some(i) => state[i] = credential,
            None => {
                debug!(credential_id = %credential.id, "added credential");
                state.push(credential);
            }
        }
        write_atomic(&self.path, &state).await
    }

    /// Remove a credential and persist. Returns the removed record if it
    /// existed.
    pub async fn remove(&self, id: Uuid) -> Result<Option<Credential>> {
        let mut state = self.state.lock().await;
        let pos = state.iter().position(|c| c.id == id);
        let removed = pos.map(|i| state.remove(i));
        if removed.is_some() {
            debug!(credential_id = %id, "removed credential");
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Enable or disable a credential and persist.
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let credential = state
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(Error::NotFound(id))?;
        credential.enabled = enabled;
        write_atomic(&self.path, &state).await
    }

    /// Add `units` to a credential's recorded usage and persist.
    ///
    /// The whole read-modify-write happens under the ledger lock, so
    /// concurrent increments never lose updates. Returns the new value.
    pub async fn increment_quota(&self, id: Uuid, units: u64) -> Result<u64> {
        let mut state = self.state.lock().await;
        let credential = state
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(Error::NotFound(id))?;
        credential.quota_used = credential.quota_used.saturating_add(units);
        let new_value = credential.quota_used;
        write_atomic(&self.path, &state).await?;
        Ok(new_value)
    }

    /// Overwrite a credential's recorded usage and persist. Used when the
    /// upstream provider's own count is known to be authoritative.
    pub async fn set_quota(&self, id: Uuid, value: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let credential = state
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(Error::NotFound(id))?;
        credential.quota_used = value;
        write_atomic(&self.path, &state).await
    }

    /// Record when a credential was last attached to a request.
    pub async fn touch_last_used(&self, id: Uuid, at_millis: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let credential = state
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(Error::NotFound(id))?;
        credential.last_used_at = Some(at_millis);
        write_atomic(&self.path, &state).await
    }

    /// Number of stored credentials.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Whether the ledger holds no credentials.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Write the ledger to disk atomically.
///
/// Temp file in the same directory, then rename over the target, so a crash
/// mid-write never leaves a truncated ledger. Permissions are 0600 since the
/// file holds API key secrets.
async fn write_atomic(path: &Path, data: &[Credential]) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Ledger(format!("serializing ledger: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Ledger("ledger path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".keys.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Ledger(format!("writing temp ledger file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Ledger(format!("setting ledger permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Ledger(format!("renaming temp ledger file: {e}")))?;

    debug!(path = %path.display(), "persisted ledger");
    Ok(())
}
