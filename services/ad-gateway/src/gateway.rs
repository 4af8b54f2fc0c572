//! Search gateway: credential-attached upstream calls with quota failover
//!
//! Each call acquires a credential from the rotator, issues the request, and
//! reports the consumed units on success. A quota-exceeded answer forces the
//! credential's recorded usage to the ceiling (the provider's count is
//! authoritative) and retries the whole operation exactly once through the
//! rotator; an explicit attempt loop bounds the retry so an exhausted pool
//! terminates instead of recursing.
//!
//! Cost model is fixed by the upstream service: 100 units for a search-type
//! request, one unit per returned item for a listing-type request.

use std::sync::Arc;

use tracing::{debug, warn};

use keypool::rotator::CredentialRotator;
use keypool::{UpstreamErrorKind, classify_status};

use crate::metrics;
use crate::upstream::{BackendError, SearchBackend, SearchPage};

/// Errors surfaced to gateway callers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No usable credential remains; the caller decides whether to retry
    /// later.
    #[error("credential pool exhausted")]
    PoolExhausted,

    /// A non-quota upstream failure; not retried locally.
    #[error("upstream request failed: {0}")]
    UpstreamRequestFailed(String),
}

/// Cost-relevant operation type, per the upstream's published pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Search,
    List,
}

impl OperationKind {
    fn cost(self, items: usize) -> u64 {
        match self {
            OperationKind::Search => 100,
            OperationKind::List => items as u64,
        }
    }

    fn label(self) -> &'static str {
        match self {
            OperationKind::Search => "search",
            OperationKind::List => "list",
        }
    }
}

enum Request<'a> {
    Search {
        query: &'a str,
        page_token: Option<&'a str>,
    },
    Channel {
        channel_id: &'a str,
        page_token: Option<&'a str>,
    },
}

/// Issues outbound search/list requests through the credential rotator.
pub struct SearchGateway {
    rotator: Arc<CredentialRotator>,
    backend: Arc<dyn SearchBackend>,
}

impl SearchGateway {
    pub fn new(rotator: Arc<CredentialRotator>, backend: Arc<dyn SearchBackend>) -> Self {
        Self { rotator, backend }
    }

    /// Keyword search. A blank query short-circuits to an empty page
    /// without touching the pool.
    pub async fn search(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, GatewayError> {
        if query.trim().is_empty() {
            return Ok(SearchPage::default());
        }
        self.execute(
            OperationKind::Search,
            Request::Search { query, page_token },
        )
        .await
    }

    /// List a channel's recent videos.
    pub async fn channel_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, GatewayError> {
        self.execute(
            OperationKind::List,
            Request::Channel {
                channel_id,
                page_token,
            },
        )
        .await
    }

    /// Acquire, issue, classify, and account for one operation.
    ///
    /// Retry budget is 1: the second attempt exists only for the
    /// quota-triggered failover path.
    async fn execute(
        &self,
        op: OperationKind,
        request: Request<'_>,
    ) -> Result<SearchPage, GatewayError> {
        const MAX_ATTEMPTS: u32 = 2;

        for attempt in 0..MAX_ATTEMPTS {
            let acquired = match self.rotator.acquire().await {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "no credential available");
                    metrics::record_pool_exhausted();
                    return Err(GatewayError::PoolExhausted);
                }
            };
            let key = acquired.secret.expose();

            let result = match &request {
                Request::Search { query, page_token } => {
                    self.backend.search(key, query, *page_token).await
                }
                Request::Channel {
                    channel_id,
                    page_token,
                } => {
                    self.backend
                        .channel_videos(key, channel_id, *page_token)
                        .await
                }
            };

            match result {
                Ok(page) => {
                    let units = op.cost(page.items.len());
                    if let Err(e) = self.rotator.report_usage(acquired.id, units).await {
                        warn!(credential_id = %acquired.id, error = %e, "failed to record usage");
                    }
                    metrics::record_quota_units(op.label(), units);
                    debug!(
                        credential_id = %acquired.id,
                        op = op.label(),
                        items = page.items.len(),
                        units,
                        "upstream call succeeded"
                    );
                    return Ok(page);
                }
                Err(BackendError::Status { status, body }) => {
                    match classify_status(status, &body) {
                        UpstreamErrorKind::QuotaExceeded => {
                            warn!(
                                credential_id = %acquired.id,
                                status,
                                attempt,
                                "upstream reports quota exhausted for this credential"
                            );
                            if let Err(e) = self.rotator.mark_exhausted(acquired.id).await {
                                warn!(credential_id = %acquired.id, error = %e, "failed to mark credential exhausted");
                            }
                            if attempt + 1 < MAX_ATTEMPTS {
                                continue;
                            }
                            return Err(GatewayError::UpstreamRequestFailed(format!(
                                "quota exceeded after retry (status {status})"
                            )));
                        }
                        UpstreamErrorKind::InvalidCredential => {
                            warn!(credential_id = %acquired.id, status, "credential rejected by upstream, disabling");
                            if let Err(e) = self.rotator.disable(acquired.id).await {
                                warn!(credential_id = %acquired.id, error = %e, "failed to disable credential");
                            }
                            return Err(GatewayError::UpstreamRequestFailed(format!(
                                "credential rejected (status {status})"
                            )));
                        }
                        UpstreamErrorKind::Other => {
                            return Err(GatewayError::UpstreamRequestFailed(format!(
                                "status {status}: {}",
                                truncate(&body, 200)
                            )));
                        }
                    }
                }
                Err(e) => {
                    return Err(GatewayError::UpstreamRequestFailed(e.to_string()));
                }
            }
        }

        // Only reachable if the final attempt hit the continue branch,
        // which the budget check prevents
        Err(GatewayError::UpstreamRequestFailed(
            "retry budget exhausted".into(),
        ))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
