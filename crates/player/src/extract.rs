//! Video URL extraction
//!
//! Accepts the URL forms viewers actually paste: full YouTube watch links,
//! shorts and embed paths, youtu.be short links, bare 11-character YouTube
//! ids, Vimeo page and player links, and Wistia media/embed links.

use url::Url;

use crate::{Platform, VideoRef};

/// Extract a playable video reference from user input.
///
/// Returns `None` for anything that does not resolve to a known platform.
pub fn parse_video_url(input: &str) -> Option<VideoRef> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if is_bare_youtube_id(input) {
        return Some(VideoRef {
            platform: Platform::Youtube,
            id: input.to_string(),
        });
    }

    // Scheme-less input like "youtube.com/watch?v=..." is still a URL to a viewer
    let url = if input.contains("://") {
        Url::parse(input).ok()?
    } else {
        Url::parse(&format!("https://{input}")).ok()?
    };

    let host = url.host_str()?.to_ascii_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if host == "youtu.be" {
        let id = segments.first()?;
        return youtube_ref(id);
    }

    if host == "youtube.com" || host.ends_with(".youtube.com") {
        if url.path() == "/watch" {
            let id = url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())?;
            return youtube_ref(&id);
        }
        if let ["shorts" | "embed", id, ..] = segments.as_slice() {
            return youtube_ref(id);
        }
        return None;
    }

    if host == "vimeo.com" || host.ends_with(".vimeo.com") {
        // Works for both vimeo.com/123 and player.vimeo.com/video/123
        let id = segments
            .iter()
            .find(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))?;
        return Some(VideoRef {
            platform: Platform::Vimeo,
            id: (*id).to_string(),
        });
    }

    if host == "wi.st" || host == "wistia.com" || host.ends_with(".wistia.com") {
        let mut iter = segments.iter();
        while let Some(segment) = iter.next() {
            if matches!(*segment, "medias" | "embed") {
                let id = iter.next()?;
                if !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric()) {
                    return Some(VideoRef {
                        platform: Platform::Wistia,
                        id: (*id).to_string(),
                    });
                }
                return None;
            }
        }
        return None;
    }

    None
}

/// YouTube video ids are exactly 11 characters of [A-Za-z0-9_-].
fn is_bare_youtube_id(input: &str) -> bool {
    input.len() == 11
        && input
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn youtube_ref(id: &str) -> Option<VideoRef> {
    if is_bare_youtube_id(id) {
        Some(VideoRef {
            platform: Platform::Youtube,
            id: id.to_string(),
        })
    } else {
        None
    }
}
