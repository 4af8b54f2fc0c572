//! Persisted advertisements and play counters
//!
//! JSON file holding the ad catalog and the per-ad play counts side by side.
//! Writes are atomic temp-file + rename, serialized by a tokio Mutex, which
//! makes `increment_play_count` an atomic read-modify-write. Catalog order
//! is insertion order and is preserved across restarts; eligibility
//! tie-breaking depends on it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ad::Advertisement;
use crate::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    ads: Vec<Advertisement>,
    #[serde(default)]
    play_counts: HashMap<Uuid, u64>,
}

/// Thread-safe ad catalog file manager.
pub struct AdStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl AdStore {
    /// Load the store from the given file path, creating it empty if absent.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Store(format!("reading ad store: {e}")))?;
            let state: StoreState = serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("parsing ad store: {e}")))?;
            info!(path = %path.display(), ads = state.ads.len(), "loaded ad store");
            state
        } else {
            info!(path = %path.display(), "ad store not found, starting empty");
            let state = StoreState::default();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Snapshot of all ads (catalog order) and their play counts.
    pub async fn snapshot(&self) -> (Vec<Advertisement>, HashMap<Uuid, u64>) {
        let state = self.state.lock().await;
        (state.ads.clone(), state.play_counts.clone())
    }

    /// Get a clone of one advertisement.
    pub async fn get(&self, id: Uuid) -> Option<Advertisement> {
        let state = self.state.lock().await;
        state.ads.iter().find(|a| a.id == id).cloned()
    }

    /// Add an advertisement, or replace it in place if the id exists.
    ///
    /// Validates first so an invalid mid-roll configuration never lands in
    /// the catalog.
    pub async fn insert(&self, ad: Advertisement) -> Result<()> {
        ad.validate()?;
        let mut state = self.state.lock().await;
        match state.ads.iter().position(|a| a.id == ad.id) {
            Some(i) => state.ads[i] = ad,
            None => {
                debug!(ad_id = %ad.id, name = %ad.name, "advertisement added");
                state.ads.push(ad);
            }
        }
        write_atomic(&self.path, &state).await
    }

    /// Remove an advertisement and its play counter (cascade).
    pub async fn remove(&self, id: Uuid) -> Result<Option<Advertisement>> {
        let mut state = self.state.lock().await;
        let pos = state.ads.iter().position(|a| a.id == id);
        let removed = pos.map(|i| state.ads.remove(i));
        if removed.is_some() {
            state.play_counts.remove(&id);
            debug!(ad_id = %id, "advertisement removed");
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Enable or disable an advertisement.
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let ad = state
            .ads
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(Error::NotFound(id))?;
        ad.enabled = enabled;
        write_atomic(&self.path, &state).await
    }

    /// Increment an advertisement's play counter by exactly 1.
    ///
    /// The counter is created implicitly at first increment. No internal
    /// deduplication: calling this twice records two plays. Returns the new
    /// count.
    pub async fn increment_play_count(&self, id: Uuid) -> Result<u64> {
        let mut state = self.state.lock().await;
        if !state.ads.iter().any(|a| a.id == id) {
            return Err(Error::NotFound(id));
        }
        let count = state.play_counts.entry(id).or_insert(0);
        *count += 1;
        let new_count = *count;
        write_atomic(&self.path, &state).await?;
        Ok(new_count)
    }

    /// Current play count for an advertisement (0 if never played).
    pub async fn play_count(&self, id: Uuid) -> u64 {
        let state = self.state.lock().await;
        state.play_counts.get(&id).copied().unwrap_or(0)
    }

    /// Number of stored advertisements.
    pub async fn len(&self) -> usize {
        self.state.lock().await.ads.len()
    }

    /// Whether the store holds no advertisements.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Write the store to disk atomically (temp file + rename).
async fn write_atomic(path: &Path, state: &StoreState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Store(format!("serializing ad store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Store("ad store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".ads.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp ad store: {e}")))?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp ad store: {e}")))?;

    debug!(path = %path.display(), "persisted ad store");
    Ok(())
}
