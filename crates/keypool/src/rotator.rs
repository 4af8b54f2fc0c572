//! Credential selection policy
//!
//! The rotator owns the in-memory view of the pool and a pointer to the
//! currently preferred credential. Selection is least-used-first: sticking
//! to the preferred key between calls avoids re-ranking churn while quota is
//! far from the ceiling, and picking the lowest recorded usage on
//! re-selection spreads load so that some key stays usable as long as
//! possible. Ties go to catalog order.
//!
//! The ledger stays the source of truth; every mutation writes through, and
//! `refresh()` re-reads it so out-of-band changes (admin edits, the
//! provider's daily reset) reach the view.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::QUOTA_CEILING;
use crate::error::{Error, Result};
use crate::ledger::{Credential, QuotaLedger};

/// A selected credential, ready to attach to an outbound request.
#[derive(Debug)]
pub struct Acquired {
    pub id: Uuid,
    pub secret: Secret<String>,
}

struct PoolView {
    credentials: Vec<Credential>,
    preferred: Option<Uuid>,
}

/// Credential pool with least-used-first selection.
pub struct CredentialRotator {
    ledger: Arc<QuotaLedger>,
    view: RwLock<PoolView>,
}

impl CredentialRotator {
    /// Build a rotator over the given ledger, reading the initial view.
    pub async fn load(ledger: Arc<QuotaLedger>) -> Self {
        let credentials = ledger.list().await;
        info!(keys = credentials.len(), "credential rotator initialized");
        Self {
            ledger,
            view: RwLock::new(PoolView {
                credentials,
                preferred: None,
            }),
        }
    }

    /// Select a credential for one outbound request.
    ///
    /// Returns the preferred credential while it remains usable. Otherwise
    /// re-selects the usable credential with the lowest recorded usage
    /// (ties broken by catalog order) and makes it preferred. Never returns
    /// a disabled credential or one at the quota ceiling.
    pub async fn acquire(&self) -> Result<Acquired> {
        let mut view = self.view.write().await;

        if let Some(preferred_id) = view.preferred {
            let preferred = view
                .credentials
                .iter()
                .find(|c| c.id == preferred_id && c.is_usable())
                .map(|c| Acquired {
                    id: c.id,
                    secret: c.secret.clone(),
                });
            match preferred {
                Some(acquired) => return Ok(acquired),
                None => {
                    debug!(credential_id = %preferred_id, "preferred credential no longer usable");
                    view.preferred = None;
                }
            }
        }

        // min_by_key keeps the first minimum, so catalog order breaks ties
        let best = view
            .credentials
            .iter()
            .filter(|c| c.is_usable())
            .min_by_key(|c| c.quota_used)
            .map(|c| Acquired {
                id: c.id,
                secret: c.secret.clone(),
            });

        match best {
            Some(acquired) => {
                info!(credential_id = %acquired.id, "selected credential");
                view.preferred = Some(acquired.id);
                Ok(acquired)
            }
            None => {
                let summary = Self::exhausted_summary(&view.credentials);
                warn!(%summary, "no usable credential in pool");
                Err(Error::PoolExhausted(summary))
            }
        }
    }

    /// Record consumed quota units against a credential.
    ///
    /// Writes through the ledger's atomic increment, stamps `last_used_at`,
    /// and clears the preference if the credential just reached the ceiling
    /// while preferred, so the next `acquire()` re-selects. Returns the new
    /// usage value.
    pub async fn report_usage(&self, id: Uuid, units: u64) -> Result<u64> {
        let new_value = self.ledger.increment_quota(id, units).await?;
        let now = now_millis();
        self.ledger.touch_last_used(id, now).await?;

        let mut view = self.view.write().await;
        if let Some(c) = view.credentials.iter_mut().find(|c| c.id == id) {
            c.quota_used = new_value;
            c.last_used_at = Some(now);
        }
        if new_value >= QUOTA_CEILING && view.preferred == Some(id) {
            info!(credential_id = %id, used = new_value, "credential reached quota ceiling");
            view.preferred = None;
        }
        debug!(credential_id = %id, units, used = new_value, "reported usage");
        Ok(new_value)
    }

    /// Force a credential's recorded usage to the ceiling.
    ///
    /// Used when upstream rejects a request as quota-exceeded: the
    /// provider's own count is authoritative and has diverged from the
    /// locally tracked estimate.
    pub async fn mark_exhausted(&self, id: Uuid) -> Result<()> {
        self.ledger.set_quota(id, QUOTA_CEILING).await?;

        let mut view = self.view.write().await;
        if let Some(c) = view.credentials.iter_mut().find(|c| c.id == id) {
            c.quota_used = QUOTA_CEILING;
        }
        if view.preferred == Some(id) {
            view.preferred = None;
        }
        warn!(credential_id = %id, "credential marked exhausted (upstream count authoritative)");
        Ok(())
    }

    /// Add a credential to the pool (admin surface).
    pub async fn add(&self, credential: Credential) -> Result<()> {
        self.ledger.insert(credential.clone()).await?;
        let mut view = self.view.write().await;
        match view.credentials.iter().position(|c| c.id == credential.id) {
            Some(i) => view.credentials[i] = credential,
            None => {
                info!(credential_id = %credential.id, name = %credential.name, "credential added");
                view.credentials.push(credential);
            }
        }
        Ok(())
    }

    /// Disable a credential; clears the preference if it was preferred.
    pub async fn disable(&self, id: Uuid) -> Result<()> {
        self.set_enabled(id, false).await
    }

    /// Re-enable a credential.
    pub async fn enable(&self, id: Uuid) -> Result<()> {
        self.set_enabled(id, true).await
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        self.ledger.set_enabled(id, enabled).await?;
        let mut view = self.view.write().await;
        if let Some(c) = view.credentials.iter_mut().find(|c| c.id == id) {
            c.enabled = enabled;
        }
        if !enabled && view.preferred == Some(id) {
            view.preferred = None;
        }
        info!(credential_id = %id, enabled, "credential enabled state changed");
        Ok(())
    }

    /// Overwrite a credential's recorded usage (admin quota correction).
    pub async fn set_quota(&self, id: Uuid, value: u64) -> Result<()> {
        self.ledger.set_quota(id, value).await?;
        let mut view = self.view.write().await;
        if let Some(c) = view.credentials.iter_mut().find(|c| c.id == id) {
            c.quota_used = value;
        }
        if value >= QUOTA_CEILING && view.preferred == Some(id) {
            view.preferred = None;
        }
        Ok(())
    }

    /// Remove a credential from the pool and the ledger.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let removed = self.ledger.remove(id).await?;
        if removed.is_none() {
            return Err(Error::NotFound(id));
        }
        let mut view = self.view.write().await;
        view.credentials.retain(|c| c.id != id);
        if view.preferred == Some(id) {
            view.preferred = None;
        }
        info!(credential_id = %id, "credential removed");
        Ok(())
    }

    /// Re-read the ledger, replacing the in-memory view.
    ///
    /// Idempotent: two consecutive calls with no intervening usage yield an
    /// identical ranking. The preference survives only while its credential
    /// is still present and usable.
    pub async fn refresh(&self) {
        let credentials = self.ledger.list().await;
        let mut view = self.view.write().await;
        view.credentials = credentials;
        if let Some(preferred_id) = view.preferred {
            let still_usable = view
                .credentials
                .iter()
                .any(|c| c.id == preferred_id && c.is_usable());
            if !still_usable {
                view.preferred = None;
            }
        }
        debug!(keys = view.credentials.len(), "pool view refreshed");
    }

    /// Number of credentials currently usable.
    pub async fn usable_count(&self) -> usize {
        let view = self.view.read().await;
        view.credentials.iter().filter(|c| c.is_usable()).count()
    }

    /// Pool summary for the health and admin endpoints. Never exposes
    /// secret values.
    ///
    /// Status mapping: all usable means healthy, some usable means
    /// degraded, none usable means unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let view = self.view.read().await;

        let mut keys = Vec::new();
        let mut usable = 0usize;
        let mut exhausted = 0usize;
        let mut disabled = 0usize;

        for c in &view.credentials {
            let status = if !c.enabled {
                disabled += 1;
                "disabled"
            } else if c.quota_used >= QUOTA_CEILING {
                exhausted += 1;
                "exhausted"
            } else {
                usable += 1;
                "usable"
            };
            keys.push(serde_json::json!({
                "id": c.id,
                "name": c.name,
                "status": status,
                "quota_used": c.quota_used,
                "quota_ceiling": QUOTA_CEILING,
                "last_used_at": c.last_used_at,
            }));
        }

        let total = view.credentials.len();
        let pool_status = if usable == total && total > 0 {
            "healthy"
        } else if usable > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": pool_status,
            "keys_total": total,
            "keys_usable": usable,
            "keys_exhausted": exhausted,
            "keys_disabled": disabled,
            "keys": keys,
        })
    }

    fn exhausted_summary(credentials: &[Credential]) -> String {
        let total = credentials.len();
        let exhausted = credentials
            .iter()
            .filter(|c| c.enabled && c.quota_used >= QUOTA_CEILING)
            .count();
        let disabled = credentials.iter().filter(|c| !c.enabled).count();
        serde_json::json!({
            "keys_total": total,
            "keys_exhausted": exhausted,
            "keys_disabled": disabled,
        })
        .to_string()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(name: &str, quota_used: u64, enabled: bool) -> Credential {
        Credential {
            id: Uuid::new_v4(),
            name: name.into(),
            secret: Secret::new(format!("AIza-{name}")),
            enabled,
            quota_used,
            last_used_at: None,
        }
    }

    async fn rotator_with(
        dir: &tempfile::TempDir,
        creds: Vec<Credential>,
    ) -> (Arc<QuotaLedger>, CredentialRotator) {
        let ledger = Arc::new(
            QuotaLedger::load(dir.path().join("keys.json"))
                .await
                .unwrap(),
        );
        for c in creds {
            ledger.insert(c).await.unwrap();
        }
        let rotator = CredentialRotator::load(ledger.clone()).await;
        (ledger, rotator)
    }

    #[tokio::test]
    async fn picks_least_used_credential() {
        // Scenario: one key near the ceiling, one fresh; the fresh key wins
        let dir = tempfile::tempdir().unwrap();
        let worn = credential("worn", 9950, true);
        let fresh = credential("fresh", 0, true);
        let fresh_id = fresh.id;
        let (_, rotator) = rotator_with(&dir, vec![worn, fresh]).await;

        let acquired = rotator.acquire().await.unwrap();
        assert_eq!(acquired.id, fresh_id);
    }

    #[tokio::test]
    async fn ties_break_by_catalog_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = credential("first", 500, true);
        let second = credential("second", 500, true);
        let first_id = first.id;
        let (_, rotator) = rotator_with(&dir, vec![first, second]).await;

        let acquired = rotator.acquire().await.unwrap();
        assert_eq!(acquired.id, first_id);
    }

    #[tokio::test]
    async fn sticks_to_preferred_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let a = credential("a", 100, true);
        let b = credential("b", 200, true);
        let a_id = a.id;
        let (_, rotator) = rotator_with(&dir, vec![a, b]).await;

        let first = rotator.acquire().await.unwrap();
        assert_eq!(first.id, a_id);

        // Usage pushes "a" above "b", but the preference holds while usable
        rotator.report_usage(a_id, 500).await.unwrap();
        let second = rotator.acquire().await.unwrap();
        assert_eq!(second.id, a_id);
    }

    #[tokio::test]
    async fn never_returns_disabled_or_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let dead = credential("dead", QUOTA_CEILING, true);
        let off = credential("off", 0, false);
        let live = credential("live", 9000, true);
        let live_id = live.id;
        let (_, rotator) = rotator_with(&dir, vec![dead, off, live]).await;

        for _ in 0..5 {
            let acquired = rotator.acquire().await.unwrap();
            assert_eq!(acquired.id, live_id);
        }
    }

    #[tokio::test]
    async fn pool_exhausted_when_nothing_usable() {
        let dir = tempfile::tempdir().unwrap();
        let dead = credential("dead", QUOTA_CEILING, true);
        let off = credential("off", 0, false);
        let (_, rotator) = rotator_with(&dir, vec![dead, off]).await;

        let err = rotator.acquire().await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"keys_total\":2"), "got: {msg}");
        assert!(msg.contains("\"keys_exhausted\":1"), "got: {msg}");
        assert!(msg.contains("\"keys_disabled\":1"), "got: {msg}");
    }

    #[tokio::test]
    async fn empty_pool_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let (_, rotator) = rotator_with(&dir, vec![]).await;
        assert!(matches!(
            rotator.acquire().await,
            Err(Error::PoolExhausted(_))
        ));
    }

    #[tokio::test]
    async fn report_usage_persists_and_stamps_last_used() {
        let dir = tempfile::tempdir().unwrap();
        let c = credential("k", 0, true);
        let id = c.id;
        let (ledger, rotator) = rotator_with(&dir, vec![c]).await;

        let new_value = rotator.report_usage(id, 100).await.unwrap();
        assert_eq!(new_value, 100);

        let persisted = ledger.get(id).await.unwrap();
        assert_eq!(persisted.quota_used, 100);
        assert!(persisted.last_used_at.is_some());
    }

    #[tokio::test]
    async fn reaching_ceiling_clears_preference_and_fails_over() {
        let dir = tempfile::tempdir().unwrap();
        let a = credential("a", 9950, true);
        let b = credential("b", 9960, true);
        let a_id = a.id;
        let b_id = b.id;
        let (_, rotator) = rotator_with(&dir, vec![a, b]).await;

        assert_eq!(rotator.acquire().await.unwrap().id, a_id);
        rotator.report_usage(a_id, 100).await.unwrap();

        // "a" hit the ceiling; next acquire must fail over to "b"
        assert_eq!(rotator.acquire().await.unwrap().id, b_id);
    }

    #[tokio::test]
    async fn mark_exhausted_forces_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let c = credential("k", 3, true);
        let id = c.id;
        let (ledger, rotator) = rotator_with(&dir, vec![c]).await;

        assert_eq!(rotator.acquire().await.unwrap().id, id);
        rotator.mark_exhausted(id).await.unwrap();

        assert_eq!(ledger.get(id).await.unwrap().quota_used, QUOTA_CEILING);
        assert!(matches!(
            rotator.acquire().await,
            Err(Error::PoolExhausted(_))
        ));
    }

    #[tokio::test]
    async fn disable_clears_preference() {
        let dir = tempfile::tempdir().unwrap();
        let a = credential("a", 0, true);
        let b = credential("b", 50, true);
        let a_id = a.id;
        let b_id = b.id;
        let (_, rotator) = rotator_with(&dir, vec![a, b]).await;

        assert_eq!(rotator.acquire().await.unwrap().id, a_id);
        rotator.disable(a_id).await.unwrap();
        assert_eq!(rotator.acquire().await.unwrap().id, b_id);

        rotator.enable(a_id).await.unwrap();
        // "b" is now preferred and stays preferred while usable
        assert_eq!(rotator.acquire().await.unwrap().id, b_id);
    }

    #[tokio::test]
    async fn remove_clears_preference_and_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let a = credential("a", 0, true);
        let b = credential("b", 50, true);
        let a_id = a.id;
        let b_id = b.id;
        let (ledger, rotator) = rotator_with(&dir, vec![a, b]).await;

        assert_eq!(rotator.acquire().await.unwrap().id, a_id);
        rotator.remove(a_id).await.unwrap();

        assert!(ledger.get(a_id).await.is_none());
        assert_eq!(rotator.acquire().await.unwrap().id, b_id);
    }

    #[tokio::test]
    async fn remove_unknown_credential_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (_, rotator) = rotator_with(&dir, vec![]).await;
        assert!(matches!(
            rotator.remove(Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let a = credential("a", 10, true);
        let b = credential("b", 20, true);
        let (_, rotator) = rotator_with(&dir, vec![a, b]).await;

        rotator.refresh().await;
        let first = rotator.health().await;
        rotator.refresh().await;
        let second = rotator.health().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refresh_picks_up_out_of_band_reset() {
        let dir = tempfile::tempdir().unwrap();
        let c = credential("k", QUOTA_CEILING, true);
        let id = c.id;
        let (ledger, rotator) = rotator_with(&dir, vec![c]).await;

        assert!(rotator.acquire().await.is_err());

        // Daily reset lands in the ledger out of band
        ledger.set_quota(id, 0).await.unwrap();
        rotator.refresh().await;

        assert_eq!(rotator.acquire().await.unwrap().id, id);
    }

    #[tokio::test]
    async fn health_status_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let a = credential("a", 0, true);
        let b = credential("b", 0, true);
        let b_id = b.id;
        let (_, rotator) = rotator_with(&dir, vec![a, b]).await;

        assert_eq!(rotator.health().await["status"], "healthy");

        rotator.mark_exhausted(b_id).await.unwrap();
        let health = rotator.health().await;
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["keys_usable"], 1);
        assert_eq!(health["keys_exhausted"], 1);
    }

    #[tokio::test]
    async fn health_never_exposes_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let c = credential("k", 0, true);
        let (_, rotator) = rotator_with(&dir, vec![c]).await;

        let rendered = rotator.health().await.to_string();
        assert!(!rendered.contains("AIza-k"), "got: {rendered}");
    }

    #[tokio::test]
    async fn acquired_debug_redacts_secret() {
        let dir = tempfile::tempdir().unwrap();
        let c = credential("k", 0, true);
        let (_, rotator) = rotator_with(&dir, vec![c]).await;

        let acquired = rotator.acquire().await.unwrap();
        let debug = format!("{acquired:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("AIza-k"));
    }
}
