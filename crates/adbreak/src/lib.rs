//! Sponsor ad insertion for third-party video playback
//!
//! Holds the configured advertisements with their per-ad play counters, and
//! the state machine that decides when an ad interrupts the main content.
//!
//! Insertion flow:
//! 1. Viewer selects a video; an eligible pre-roll (if any) plays first
//! 2. Main-content progress ticks are checked against each mid-roll ad's
//!    interval boundaries by floor division; crossing one inserts the ad
//! 3. When an ad completes (natural end or a valid skip), its play counter
//!    is incremented exactly once; ads at their play ceiling stop being
//!    offered
//! 4. Selecting a different video resets the session with no side effects

pub mod ad;
pub mod catalog;
pub mod error;
pub mod scheduler;
pub mod store;

pub use ad::{AdKind, Advertisement, MIN_MID_ROLL_INTERVAL_SECS};
pub use catalog::AdCatalog;
pub use error::{Error, Result};
pub use scheduler::{Directive, PlaybackScheduler, SessionEvent, SessionState, handle_event};
pub use store::AdStore;
