//! Playback state machine
//!
//! Pure state machine: receives player events, returns (new_state,
//! directives). The caller executes the I/O implied by each directive, which
//! keeps this transition table the single place control flow is decided and
//! makes every path testable without player wiring.
//!
//! States and transitions:
//! - NoVideo -> PreRollPending on video selection when a pre-roll is
//!   eligible, otherwise straight to PlayingMain
//! - PreRollPending -> PlayingAd on the ad player's first progress report
//!   (pre-roll starts without delay; main content stays paused)
//! - PlayingAd -> PlayingMain on ad completion: natural end, or a skip once
//!   elapsed ad time reaches the ad's skip threshold. Completion emits
//!   RecordPlay exactly once. A mid-roll resumes main content from the
//!   saved checkpoint; a pre-roll starts it from zero.
//! - PlayingMain -> PlayingAd when a progress tick crosses a mid-roll
//!   interval boundary; the tick's position becomes the resume checkpoint.
//! - any state -> NoVideo on selection of a different video, with no
//!   play-count side effects for an abandoned ad.
//!
//! An ad player failure during PlayingAd counts as completion for the
//! transition (the viewer is never stuck behind a broken ad) but does NOT
//! emit RecordPlay: only a natural end or a valid skip is a counted play.

use tracing::{debug, warn};
use uuid::Uuid;

use player::PlayerEvent;

use crate::ad::Advertisement;
use crate::catalog::AdCatalog;

/// Phase of one playback session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No video selected.
    NoVideo,
    /// A pre-roll was chosen and told to start; its player has not reported
    /// progress yet. Main content stays paused.
    PreRollPending { ad: Advertisement },
    /// An advertisement is playing. `resume_at_secs` is the main-content
    /// checkpoint to return to (zero for a pre-roll).
    PlayingAd {
        ad: Advertisement,
        ad_elapsed_secs: f64,
        resume_at_secs: f64,
    },
    /// Main content is playing; `elapsed_secs` is the last progress sample.
    PlayingMain { elapsed_secs: f64 },
}

impl SessionState {
    /// Wire label for API responses and logs.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::NoVideo => "no_video",
            SessionState::PreRollPending { .. } => "pre_roll_pending",
            SessionState::PlayingAd { .. } => "playing_ad",
            SessionState::PlayingMain { .. } => "playing_main",
        }
    }

    /// Whether the skip control is currently available.
    pub fn skippable(&self) -> bool {
        match self {
            SessionState::PlayingAd {
                ad,
                ad_elapsed_secs,
                ..
            } => *ad_elapsed_secs >= f64::from(ad.skip_after_secs),
            _ => false,
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A video was selected (the first one, or a different one mid-session).
    VideoSelected,
    /// Notification from the main-content player.
    Main(PlayerEvent),
    /// Notification from the ad player.
    Ad(PlayerEvent),
    /// Viewer pressed the skip control.
    SkipRequested,
    /// The viewer surface was closed.
    Closed,
}

/// I/O the caller must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Start (or restart) the ad player for this advertisement; pause main.
    PlayAd { ad: Advertisement },
    /// Start or resume the main-content player at the given position.
    PlayMain { from_secs: f64 },
    /// Increment the advertisement's play counter by exactly one.
    RecordPlay { ad_id: Uuid },
    /// A main-content failure the core cannot recover from; surface it.
    SurfaceError { message: String },
}

/// Apply one event to a session state.
///
/// Consults the catalog for eligibility; never mutates it. Play-count
/// increments happen only when the caller executes a `RecordPlay`
/// directive, so an event that is re-examined here can never double-count.
pub async fn handle_event(
    state: SessionState,
    event: SessionEvent,
    catalog: &AdCatalog,
) -> (SessionState, Vec<Directive>) {
    match (state, event) {
        // Selecting a video resets unconditionally: an ad abandoned by
        // navigation is never counted.
        (_, SessionEvent::VideoSelected) => match catalog.eligible_pre_roll().await {
            Some(ad) => {
                debug!(ad_id = %ad.id, "pre-roll selected for new session");
                let directives = vec![Directive::PlayAd { ad: ad.clone() }];
                (SessionState::PreRollPending { ad }, directives)
            }
            None => (
                SessionState::PlayingMain { elapsed_secs: 0.0 },
                vec![Directive::PlayMain { from_secs: 0.0 }],
            ),
        },

        (_, SessionEvent::Closed) => (SessionState::NoVideo, vec![]),

        // The pre-roll player came alive
        (
            SessionState::PreRollPending { ad },
            SessionEvent::Ad(PlayerEvent::Progress { seconds }),
        ) => (
            SessionState::PlayingAd {
                ad,
                ad_elapsed_secs: seconds,
                resume_at_secs: 0.0,
            },
            vec![],
        ),

        // Degenerate but possible: the pre-roll ends (or breaks) before any
        // progress report arrives
        (SessionState::PreRollPending { ad }, SessionEvent::Ad(PlayerEvent::Ended)) => {
            complete_ad(ad, 0.0)
        }
        (
            SessionState::PreRollPending { ad },
            SessionEvent::Ad(PlayerEvent::Failed { message }),
        ) => abandon_broken_ad(ad, 0.0, &message),
        (SessionState::PreRollPending { ad }, SessionEvent::SkipRequested) => {
            if ad.skip_after_secs == 0 {
                complete_ad(ad, 0.0)
            } else {
                (SessionState::PreRollPending { ad }, vec![])
            }
        }

        (
            SessionState::PlayingAd {
                ad, resume_at_secs, ..
            },
            SessionEvent::Ad(PlayerEvent::Progress { seconds }),
        ) => (
            SessionState::PlayingAd {
                ad,
                ad_elapsed_secs: seconds,
                resume_at_secs,
            },
            vec![],
        ),

        (
            SessionState::PlayingAd {
                ad, resume_at_secs, ..
            },
            SessionEvent::Ad(PlayerEvent::Ended),
        ) => complete_ad(ad, resume_at_secs),

        (
            SessionState::PlayingAd {
                ad, resume_at_secs, ..
            },
            SessionEvent::Ad(PlayerEvent::Failed { message }),
        ) => abandon_broken_ad(ad, resume_at_secs, &message),

        (
            SessionState::PlayingAd {
                ad,
                ad_elapsed_secs,
                resume_at_secs,
            },
            SessionEvent::SkipRequested,
        ) => {
            if ad_elapsed_secs >= f64::from(ad.skip_after_secs) {
                complete_ad(ad, resume_at_secs)
            } else {
                // Skip control is not available yet: no-op
                (
                    SessionState::PlayingAd {
                        ad,
                        ad_elapsed_secs,
                        resume_at_secs,
                    },
                    vec![],
                )
            }
        }

        // Main content is paused behind the ad; its events are ignored
        (state @ SessionState::PlayingAd { .. }, SessionEvent::Main(_)) => (state, vec![]),
        (state @ SessionState::PreRollPending { .. }, SessionEvent::Main(_)) => (state, vec![]),

        (
            SessionState::PlayingMain { elapsed_secs },
            SessionEvent::Main(PlayerEvent::Progress { seconds }),
        ) => {
            match catalog
                .eligible_mid_roll_crossing(elapsed_secs, seconds)
                .await
            {
                Some(ad) => {
                    debug!(ad_id = %ad.id, at_secs = seconds, "mid-roll interval crossed");
                    let directives = vec![Directive::PlayAd { ad: ad.clone() }];
                    (
                        SessionState::PlayingAd {
                            ad,
                            ad_elapsed_secs: 0.0,
                            resume_at_secs: seconds,
                        },
                        directives,
                    )
                }
                None => (
                    SessionState::PlayingMain {
                        elapsed_secs: seconds,
                    },
                    vec![],
                ),
            }
        }

        (SessionState::PlayingMain { .. }, SessionEvent::Main(PlayerEvent::Ended)) => {
            (SessionState::NoVideo, vec![])
        }

        (
            state @ SessionState::PlayingMain { .. },
            SessionEvent::Main(PlayerEvent::Failed { message }),
        ) => {
            warn!(%message, "main playback failed");
            (state, vec![Directive::SurfaceError { message }])
        }

        // Everything else (ad events with no ad active, skips outside ads)
        (state, event) => {
            debug!(state = state.label(), ?event, "event ignored in this state");
            (state, vec![])
        }
    }
}

/// Ad completion: count the play exactly once, then hand control back to
/// main content at the saved checkpoint.
fn complete_ad(ad: Advertisement, resume_at_secs: f64) -> (SessionState, Vec<Directive>) {
    debug!(ad_id = %ad.id, kind = ad.kind.label(), "ad completed");
    (
        SessionState::PlayingMain {
            elapsed_secs: resume_at_secs,
        },
        vec![
            Directive::RecordPlay { ad_id: ad.id },
            Directive::PlayMain {
                from_secs: resume_at_secs,
            },
        ],
    )
}

/// A broken ad is abandoned, not counted: resume main content so the viewer
/// is never stuck, without consuming the ad's play budget.
fn abandon_broken_ad(
    ad: Advertisement,
    resume_at_secs: f64,
    message: &str,
) -> (SessionState, Vec<Directive>) {
    warn!(ad_id = %ad.id, %message, "ad playback failed, resuming main content");
    (
        SessionState::PlayingMain {
            elapsed_secs: resume_at_secs,
        },
        vec![Directive::PlayMain {
            from_secs: resume_at_secs,
        }],
    )
}

/// Stateful wrapper over [`handle_event`] holding one session's state.
pub struct PlaybackScheduler {
    state: SessionState,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self {
            state: SessionState::NoVideo,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Feed one event; returns the directives the caller must execute.
    pub async fn on_event(&mut self, catalog: &AdCatalog, event: SessionEvent) -> Vec<Directive> {
        let current = std::mem::replace(&mut self.state, SessionState::NoVideo);
        let (next, directives) = handle_event(current, event, catalog).await;
        self.state = next;
        directives
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}
