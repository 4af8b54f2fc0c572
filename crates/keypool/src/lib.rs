//! Quota-aware credential pool for the rate-limited video-search API
//!
//! Spreads outbound requests across multiple API keys so a single exhausted
//! key never interrupts service. The ledger file is the single source of
//! truth for per-key counters; the rotator keeps an in-memory view and owns
//! the selection policy.
//!
//! Credential lifecycle:
//! 1. Admin adds a key, stored with `quota_used = 0`, usable immediately
//! 2. Rotator prefers the key it handed out last while that key stays usable
//! 3. When the preferred key is exhausted or disabled, the usable key with
//!    the lowest recorded usage takes over (ties broken by catalog order)
//! 4. A quota-exceeded response from upstream forces the key's recorded
//!    usage to the ceiling (the provider's count is authoritative)
//! 5. The upstream provider resets usage daily; a background task re-reads
//!    the ledger so out-of-band resets reach the in-memory view

pub mod error;
pub mod ledger;
pub mod quota;
pub mod refresh;
pub mod rotator;

pub use error::{Error, Result};
pub use ledger::{Credential, QuotaLedger};
pub use quota::{UpstreamErrorKind, classify_status};
pub use refresh::spawn_refresh_task;
pub use rotator::{Acquired, CredentialRotator};

/// Fixed per-credential quota ceiling: the upstream service's published
/// daily allowance in request-cost units. Not configurable per credential.
pub const QUOTA_CEILING: u64 = 10_000;
