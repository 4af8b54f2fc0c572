//! Ad eligibility queries
//!
//! The catalog keeps an in-memory view of the configured ads and their play
//! counts, answers the scheduler's eligibility queries, and writes play
//! increments through the store. Interval crossings are computed by floor
//! division of elapsed seconds rather than a running timer, so irregular
//! progress-event cadence and backward seeks never desynchronize insertion
//! as long as callers pass the true previous/current elapsed values.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ad::{AdKind, Advertisement};
use crate::error::Result;
use crate::store::AdStore;

struct CatalogView {
    ads: Vec<Advertisement>,
    counts: HashMap<Uuid, u64>,
}

impl CatalogView {
    /// Enabled and under its play ceiling (0 means unlimited).
    fn offerable(&self, ad: &Advertisement) -> bool {
        let count = self.counts.get(&ad.id).copied().unwrap_or(0);
        ad.enabled && (ad.max_plays == 0 || count < ad.max_plays)
    }
}

/// In-memory ad catalog backed by an [`AdStore`].
pub struct AdCatalog {
    store: Arc<AdStore>,
    view: RwLock<CatalogView>,
}

impl AdCatalog {
    /// Build a catalog over the given store, reading the initial view.
    pub async fn load(store: Arc<AdStore>) -> Self {
        let (ads, counts) = store.snapshot().await;
        info!(ads = ads.len(), "ad catalog initialized");
        Self {
            store,
            view: RwLock::new(CatalogView { ads, counts }),
        }
    }

    /// First offerable pre-roll in catalog order, if any.
    pub async fn eligible_pre_roll(&self) -> Option<Advertisement> {
        let view = self.view.read().await;
        view.ads
            .iter()
            .find(|ad| ad.kind == AdKind::PreRoll && view.offerable(ad))
            .cloned()
    }

    /// First offerable mid-roll whose interval boundary was passed between
    /// the two progress samples, in catalog order.
    ///
    /// An ad is a crossing candidate when
    /// `floor(cur / interval) > floor(prev / interval)`. Two ads crossing on
    /// the same tick resolve by catalog order; the loser stays eligible for
    /// its own next crossing.
    pub async fn eligible_mid_roll_crossing(
        &self,
        prev_secs: f64,
        cur_secs: f64,
    ) -> Option<Advertisement> {
        let view = self.view.read().await;
        view.ads
            .iter()
            .find(|ad| {
                if ad.kind != AdKind::MidRoll || !view.offerable(ad) {
                    return false;
                }
                match ad.interval_secs {
                    Some(interval) if interval > 0 => {
                        let interval = f64::from(interval);
                        (cur_secs / interval).floor() > (prev_secs / interval).floor()
                    }
                    _ => false,
                }
            })
            .cloned()
    }

    /// Record one completed play for an advertisement.
    ///
    /// Writes through the store's atomic increment and updates the view.
    /// No internal deduplication: the scheduler guarantees exactly one call
    /// per completion. Returns the new count.
    pub async fn record_play(&self, ad_id: Uuid) -> Result<u64> {
        let new_count = self.store.increment_play_count(ad_id).await?;
        let mut view = self.view.write().await;
        view.counts.insert(ad_id, new_count);
        debug!(%ad_id, count = new_count, "recorded ad play");
        Ok(new_count)
    }

    /// Get a clone of one advertisement from the view.
    pub async fn get(&self, ad_id: Uuid) -> Option<Advertisement> {
        let view = self.view.read().await;
        view.ads.iter().find(|a| a.id == ad_id).cloned()
    }

    /// Current play count for an advertisement.
    pub async fn play_count(&self, ad_id: Uuid) -> u64 {
        let view = self.view.read().await;
        view.counts.get(&ad_id).copied().unwrap_or(0)
    }

    /// Re-read the store, replacing the in-memory view (admin edits arrive
    /// out of band).
    pub async fn refresh(&self) {
        let (ads, counts) = self.store.snapshot().await;
        let mut view = self.view.write().await;
        view.ads = ads;
        view.counts = counts;
        debug!(ads = view.ads.len(), "ad catalog refreshed");
    }

    /// Catalog summary for the health endpoint.
    pub async fn summary(&self) -> serde_json::Value {
        let view = self.view.read().await;
        let enabled = view.ads.iter().filter(|a| a.enabled).count();
        serde_json::json!({
            "ads_total": view.ads.len(),
            "ads_enabled": enabled,
        })
    }
}
