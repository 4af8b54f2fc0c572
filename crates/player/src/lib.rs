//! Video platform model and player event contract
//!
//! The gateway treats each embedded player (main video or advertisement) as
//! an opaque surface that emits a narrow stream of notifications: progress,
//! end-of-stream, and fatal error. The playback scheduler consumes these
//! events; commands back to the player travel as scheduler directives, so no
//! callback wiring exists anywhere in the core.

mod events;
mod extract;

pub use events::PlayerEvent;
pub use extract::parse_video_url;

use serde::{Deserialize, Serialize};

/// Playback backend that renders a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Vimeo,
    Wistia,
}

impl Platform {
    /// Label used in logs and API responses.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Vimeo => "vimeo",
            Platform::Wistia => "wistia",
        }
    }
}

/// A playable video: which backend renders it and its backend-native id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub platform: Platform,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_labels() {
        assert_eq!(Platform::Youtube.label(), "youtube");
        assert_eq!(Platform::Vimeo.label(), "vimeo");
        assert_eq!(Platform::Wistia.label(), "wistia");
    }

    #[test]
    fn platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::Wistia).unwrap();
        assert_eq!(json, "\"wistia\"");
    }
}
