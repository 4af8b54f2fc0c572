//! Advertisement model and configuration validation

use player::Platform;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Minimum spacing between mid-roll insertions, in main-video seconds.
pub const MIN_MID_ROLL_INTERVAL_SECS: u32 = 30;

/// Where in playback an advertisement is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdKind {
    /// Shown once, before main content begins.
    PreRoll,
    /// Shown at fixed elapsed-time intervals during main content.
    MidRoll,
}

impl AdKind {
    pub fn label(&self) -> &'static str {
        match self {
            AdKind::PreRoll => "pre-roll",
            AdKind::MidRoll => "mid-roll",
        }
    }
}

/// A configured sponsor advertisement.
///
/// Created and edited by the admin surface; the scheduler reads these and
/// only ever mutates the associated play counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub kind: AdKind,
    pub platform: Platform,
    /// The viewer may skip once elapsed ad time reaches this.
    pub skip_after_secs: u32,
    /// Mid-roll only: spacing between insertions in main-video seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u32>,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_plays: u64,
    pub enabled: bool,
}

impl Advertisement {
    /// Reject configurations the scheduler must never see: an interval is
    /// present and at least `MIN_MID_ROLL_INTERVAL_SECS` exactly when the
    /// ad is a mid-roll.
    pub fn validate(&self) -> Result<()> {
        match (self.kind, self.interval_secs) {
            (AdKind::MidRoll, Some(i)) if i >= MIN_MID_ROLL_INTERVAL_SECS => Ok(()),
            (AdKind::MidRoll, Some(i)) => Err(Error::InvalidAdConfig(format!(
                "mid-roll interval must be at least {MIN_MID_ROLL_INTERVAL_SECS}s, got {i}s"
            ))),
            (AdKind::MidRoll, None) => Err(Error::InvalidAdConfig(
                "mid-roll advertisement requires an interval".into(),
            )),
            (AdKind::PreRoll, Some(_)) => Err(Error::InvalidAdConfig(
                "pre-roll advertisement must not set an interval".into(),
            )),
            (AdKind::PreRoll, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ad(kind: AdKind, interval_secs: Option<u32>) -> Advertisement {
        Advertisement {
            id: Uuid::new_v4(),
            name: "sponsor".into(),
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
            kind,
            platform: Platform::Youtube,
            skip_after_secs: 5,
            interval_secs,
            max_plays: 0,
            enabled: true,
        }
    }

    #[test]
    fn valid_pre_roll() {
        assert!(base_ad(AdKind::PreRoll, None).validate().is_ok());
    }

    #[test]
    fn valid_mid_roll() {
        assert!(base_ad(AdKind::MidRoll, Some(300)).validate().is_ok());
        assert!(base_ad(AdKind::MidRoll, Some(30)).validate().is_ok());
    }

    #[test]
    fn mid_roll_without_interval_rejected() {
        let err = base_ad(AdKind::MidRoll, None).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidAdConfig(_)));
    }

    #[test]
    fn mid_roll_interval_below_minimum_rejected() {
        let err = base_ad(AdKind::MidRoll, Some(29)).validate().unwrap_err();
        assert!(err.to_string().contains("at least 30s"), "got: {err}");
    }

    #[test]
    fn pre_roll_with_interval_rejected() {
        let err = base_ad(AdKind::PreRoll, Some(60)).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidAdConfig(_)));
    }

    #[test]
    fn kind_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&AdKind::PreRoll).unwrap(), "\"pre-roll\"");
        assert_eq!(serde_json::to_string(&AdKind::MidRoll).unwrap(), "\"mid-roll\"");
    }

    #[test]
    fn interval_omitted_from_json_when_absent() {
        let json = serde_json::to_string(&base_ad(AdKind::PreRoll, None)).unwrap();
        assert!(!json.contains("interval_secs"));
    }
}
