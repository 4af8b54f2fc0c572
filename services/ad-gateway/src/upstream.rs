//! Upstream video-search API backend
//!
//! Defines the `SearchBackend` trait that decouples the gateway's credential
//! and retry logic from the wire, plus the HTTP implementation against a
//! YouTube-Data-API-compatible base URL. Errors keep the raw status and body
//! so the gateway can classify quota exhaustion.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn SearchBackend>`).

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// One result entry from a search or listing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_id: String,
    pub channel_title: String,
    pub thumbnail_url: String,
    pub published_at: String,
}

/// One page of results plus the continuation token, if any.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchPage {
    pub items: Vec<VideoSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Errors from the upstream backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Upstream answered with a non-success status. Body is kept verbatim
    /// for quota classification.
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced an upstream response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered 2xx but the payload didn't parse.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// Abstraction over the upstream search service.
pub trait SearchBackend: Send + Sync {
    /// Keyword search for videos.
    fn search<'a>(
        &'a self,
        key: &'a str,
        query: &'a str,
        page_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SearchPage, BackendError>> + Send + 'a>>;

    /// List a channel's recent videos.
    fn channel_videos<'a>(
        &'a self,
        key: &'a str,
        channel_id: &'a str,
        page_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SearchPage, BackendError>> + Send + 'a>>;
}

/// HTTP backend against a configurable base URL.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl HttpSearchBackend {
    pub fn new(client: reqwest::Client, base_url: String, page_size: u32) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size,
        }
    }

    async fn get_page(&self, url: Url) -> Result<SearchPage, BackendError> {
        debug!(path = url.path(), "upstream request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(BackendError::Status { status, body });
        }

        parse_page(&body)
    }
}

impl SearchBackend for HttpSearchBackend {
    fn search<'a>(
        &'a self,
        key: &'a str,
        query: &'a str,
        page_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SearchPage, BackendError>> + Send + 'a>> {
        Box::pin(async move {
            let url = build_search_url(&self.base_url, self.page_size, key, query, page_token)
                .map_err(BackendError::Malformed)?;
            self.get_page(url).await
        })
    }

    fn channel_videos<'a>(
        &'a self,
        key: &'a str,
        channel_id: &'a str,
        page_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SearchPage, BackendError>> + Send + 'a>> {
        Box::pin(async move {
            let url =
                build_channel_url(&self.base_url, self.page_size, key, channel_id, page_token)
                    .map_err(BackendError::Malformed)?;
            self.get_page(url).await
        })
    }
}

/// Build the keyword-search request URL.
fn build_search_url(
    base_url: &str,
    page_size: u32,
    key: &str,
    query: &str,
    page_token: Option<&str>,
) -> Result<Url, String> {
    let mut url =
        Url::parse(&format!("{base_url}/search")).map_err(|e| format!("bad base url: {e}"))?;
    url.query_pairs_mut()
        .append_pair("part", "snippet")
        .append_pair("maxResults", &page_size.to_string())
        .append_pair("q", query)
        .append_pair("type", "video")
        .append_pair("order", "date")
        .append_pair("key", key);
    if let Some(token) = page_token {
        url.query_pairs_mut().append_pair("pageToken", token);
    }
    Ok(url)
}

/// Build the channel-listing request URL.
fn build_channel_url(
    base_url: &str,
    page_size: u32,
    key: &str,
    channel_id: &str,
    page_token: Option<&str>,
) -> Result<Url, String> {
    let mut url =
        Url::parse(&format!("{base_url}/search")).map_err(|e| format!("bad base url: {e}"))?;
    url.query_pairs_mut()
        .append_pair("part", "snippet")
        .append_pair("maxResults", &page_size.to_string())
        .append_pair("channelId", channel_id)
        .append_pair("type", "video")
        .append_pair("order", "date")
        .append_pair("key", key);
    if let Some(token) = page_token {
        url.query_pairs_mut().append_pair("pageToken", token);
    }
    Ok(url)
}

/// Map the upstream payload into a [`SearchPage`].
///
/// Entries without a video id (channel or playlist matches) are dropped
/// rather than failing the whole page.
fn parse_page(body: &str) -> Result<SearchPage, BackendError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ApiResponse {
        #[serde(default)]
        items: Vec<ApiItem>,
        next_page_token: Option<String>,
    }

    #[derive(Deserialize)]
    struct ApiItem {
        #[serde(default)]
        id: ApiItemId,
        #[serde(default)]
        snippet: ApiSnippet,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase")]
    struct ApiItemId {
        video_id: Option<String>,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase")]
    struct ApiSnippet {
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        channel_id: String,
        #[serde(default)]
        channel_title: String,
        #[serde(default)]
        published_at: String,
        #[serde(default)]
        thumbnails: ApiThumbnails,
    }

    #[derive(Deserialize, Default)]
    struct ApiThumbnails {
        #[serde(default)]
        medium: ApiThumbnail,
    }

    #[derive(Deserialize, Default)]
    struct ApiThumbnail {
        #[serde(default)]
        url: String,
    }

    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))?;

    let items = parsed
        .items
        .into_iter()
        .filter_map(|item| {
            let video_id = item.id.video_id?;
            Some(VideoSummary {
                video_id,
                title: item.snippet.title,
                description: item.snippet.description,
                channel_id: item.snippet.channel_id,
                channel_title: item.snippet.channel_title,
                thumbnail_url: item.snippet.thumbnails.medium.url,
                published_at: item.snippet.published_at,
            })
        })
        .collect();

    Ok(SearchPage {
        items,
        next_page_token: parsed.next_page_token,
    })
}
