//! Periodic pool refresh
//!
//! The ledger changes out of band: the admin surface edits keys, and the
//! upstream provider's daily quota reset is mirrored into stored counters.
//! A background task re-reads the ledger on an interval so the rotator's
//! in-memory ranking stays consistent with reality.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::rotator::CredentialRotator;

/// Spawn a background task that refreshes the rotator's view every
/// `interval`.
///
/// The first tick is skipped: the view was just loaded. Returns the
/// `JoinHandle` for the spawned task.
pub fn spawn_refresh_task(
    rotator: Arc<CredentialRotator>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The view was loaded moments ago; skip the immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            rotator.refresh().await;
            debug!("periodic pool refresh complete");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use uuid::Uuid;

    use crate::QUOTA_CEILING;
    use crate::ledger::{Credential, QuotaLedger};

    async fn exhausted_pool(
        dir: &tempfile::TempDir,
    ) -> (Uuid, Arc<QuotaLedger>, Arc<CredentialRotator>) {
        let ledger = Arc::new(
            QuotaLedger::load(dir.path().join("keys.json"))
                .await
                .unwrap(),
        );
        let id = Uuid::new_v4();
        ledger
            .insert(Credential {
                id,
                name: "sole".into(),
                secret: Secret::new("AIza-sole".into()),
                enabled: true,
                quota_used: QUOTA_CEILING,
                last_used_at: None,
            })
            .await
            .unwrap();
        let rotator = Arc::new(CredentialRotator::load(ledger.clone()).await);
        (id, ledger, rotator)
    }

    #[tokio::test(start_paused = true)]
    async fn task_picks_up_daily_reset() {
        let dir = tempfile::tempdir().unwrap();
        let (id, ledger, rotator) = exhausted_pool(&dir).await;
        assert!(rotator.acquire().await.is_err());

        let handle = spawn_refresh_task(rotator.clone(), Duration::from_secs(300));

        // The provider's daily reset lands in the ledger out of band
        ledger.set_quota(id, 0).await.unwrap();

        // Ride past one refresh interval; paused time auto-advances
        tokio::time::sleep(Duration::from_secs(301)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(rotator.acquire().await.unwrap().id, id);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (id, ledger, rotator) = exhausted_pool(&dir).await;

        let handle = spawn_refresh_task(rotator.clone(), Duration::from_secs(300));
        ledger.set_quota(id, 0).await.unwrap();

        // Well inside the first interval: no refresh has run yet
        tokio::time::sleep(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert!(rotator.acquire().await.is_err());
        handle.abort();
    }
}
