//! Player notification contract
//!
//! Providers fire progress callbacks at their own cadence; nothing here may
//! assume uniform spacing between samples.

/// Notification emitted by an embedded player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Playback position report, in elapsed seconds.
    Progress { seconds: f64 },
    /// The player reached end-of-stream.
    Ended,
    /// The player hit a fatal error and will not continue.
    Failed { message: String },
}
