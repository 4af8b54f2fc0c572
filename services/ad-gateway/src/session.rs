//! Playback session surface
//!
//! Composes one `PlaybackScheduler` per viewer session and executes the
//! directives each event produces. This layer is the single writer for play
//! counters: `RecordPlay` directives are applied to the catalog here, once,
//! at the transition that produced them; everything else is returned to the
//! client so it can drive the actual player embeds.
//!
//! Events for a session are handled to completion in arrival order (the
//! manager lock serializes them), so rapid progress ticks can never reorder
//! or drop a crossing check.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use adbreak::{AdCatalog, Directive, PlaybackScheduler, SessionEvent};
use player::{PlayerEvent, VideoRef, parse_video_url};

use crate::metrics;

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unrecognized video url")]
    InvalidUrl,

    #[error("session not found: {0}")]
    NotFound(Uuid),
}

struct Session {
    video: VideoRef,
    scheduler: PlaybackScheduler,
}

/// Holds all live playback sessions.
pub struct SessionManager {
    catalog: Arc<AdCatalog>,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

/// Wire event from the viewer surface.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireEvent {
    MainProgress {
        seconds: f64,
    },
    MainEnded,
    MainFailed {
        #[serde(default)]
        message: String,
    },
    AdProgress {
        seconds: f64,
    },
    AdEnded,
    AdFailed {
        #[serde(default)]
        message: String,
    },
    Skip,
    /// The viewer picked a different video inside the same surface.
    VideoSelected {
        url: String,
    },
}

/// Directive rendered for the client. `RecordPlay` is executed server-side
/// and never appears here.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WireDirective {
    PlayAd {
        ad_id: Uuid,
        url: String,
        platform: player::Platform,
        skip_after_secs: u32,
    },
    PlayMain {
        from_secs: f64,
    },
    SurfaceError {
        message: String,
    },
}

/// Session snapshot returned from every call.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub video: VideoRef,
    pub state: &'static str,
    pub skippable: bool,
    pub directives: Vec<WireDirective>,
}

impl SessionManager {
    pub fn new(catalog: Arc<AdCatalog>) -> Self {
        Self {
            catalog,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a session for the given video URL.
    pub async fn create(&self, url: &str) -> Result<SessionView, SessionError> {
        let video = parse_video_url(url).ok_or(SessionError::InvalidUrl)?;
        let session_id = Uuid::new_v4();

        let mut sessions = self.sessions.lock().await;
        let mut session = Session {
            video: video.clone(),
            scheduler: PlaybackScheduler::new(),
        };
        let directives = session
            .scheduler
            .on_event(&self.catalog, SessionEvent::VideoSelected)
            .await;
        let view = self.render(session_id, &session, directives).await;
        sessions.insert(session_id, session);

        info!(%session_id, platform = video.platform.label(), video_id = %video.id, "session created");
        Ok(view)
    }

    /// Feed one wire event into a session.
    pub async fn handle(&self, session_id: Uuid, event: WireEvent) -> Result<SessionView, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;

        let session_event = match event {
            WireEvent::MainProgress { seconds } => {
                SessionEvent::Main(PlayerEvent::Progress { seconds })
            }
            WireEvent::MainEnded => SessionEvent::Main(PlayerEvent::Ended),
            WireEvent::MainFailed { message } => SessionEvent::Main(PlayerEvent::Failed { message }),
            WireEvent::AdProgress { seconds } => {
                SessionEvent::Ad(PlayerEvent::Progress { seconds })
            }
            WireEvent::AdEnded => SessionEvent::Ad(PlayerEvent::Ended),
            WireEvent::AdFailed { message } => SessionEvent::Ad(PlayerEvent::Failed { message }),
            WireEvent::Skip => SessionEvent::SkipRequested,
            WireEvent::VideoSelected { url } => {
                let video = parse_video_url(&url).ok_or(SessionError::InvalidUrl)?;
                session.video = video;
                SessionEvent::VideoSelected
            }
        };

        let directives = session
            .scheduler
            .on_event(&self.catalog, session_event)
            .await;
        Ok(self.render(session_id, session, directives).await)
    }

    /// Close a session. Returns whether it existed.
    pub async fn close(&self, session_id: Uuid) -> bool {
        let removed = self.sessions.lock().await.remove(&session_id);
        if removed.is_some() {
            debug!(%session_id, "session closed");
        }
        removed.is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Execute server-side directives and render the rest for the client.
    async fn render(
        &self,
        session_id: Uuid,
        session: &Session,
        directives: Vec<Directive>,
    ) -> SessionView {
        let mut wire = Vec::new();
        for directive in directives {
            match directive {
                Directive::RecordPlay { ad_id } => {
                    let kind = self
                        .catalog
                        .get(ad_id)
                        .await
                        .map(|ad| ad.kind.label())
                        .unwrap_or("unknown");
                    match self.catalog.record_play(ad_id).await {
                        Ok(count) => {
                            debug!(%ad_id, count, "play recorded");
                            metrics::record_ad_play(kind);
                        }
                        // The ad may have been deleted while playing; the
                        // completed view is still valid
                        Err(e) => warn!(%ad_id, error = %e, "failed to record play"),
                    }
                }
                Directive::PlayAd { ad } => {
                    wire.push(WireDirective::PlayAd {
                        ad_id: ad.id,
                        url: ad.url.clone(),
                        platform: ad.platform,
                        skip_after_secs: ad.skip_after_secs,
                    });
                }
                Directive::PlayMain { from_secs } => {
                    wire.push(WireDirective::PlayMain { from_secs });
                }
                Directive::SurfaceError { message } => {
                    wire.push(WireDirective::SurfaceError { message });
                }
            }
        }

        SessionView {
            session_id,
            video: session.video.clone(),
            state: session.scheduler.state().label(),
            skippable: session.scheduler.state().skippable(),
            directives: wire,
        }
    }
}

/// Shared state for session handlers.
#[derive(Clone)]
pub struct SessionApi {
    pub manager: Arc<SessionManager>,
}

/// Build the session router.
pub fn build_session_router(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/{id}/events", post(session_event))
        .route("/v1/sessions/{id}", delete(close_session))
        .with_state(SessionApi { manager })
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    url: String,
}

async fn create_session(
    State(api): State<SessionApi>,
    axum::Json(body): axum::Json<CreateSessionRequest>,
) -> impl IntoResponse {
    match api.manager.create(&body.url).await {
        Ok(view) => json_response(StatusCode::CREATED, &view),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn session_event(
    State(api): State<SessionApi>,
    Path(id): Path<Uuid>,
    axum::Json(event): axum::Json<WireEvent>,
) -> impl IntoResponse {
    match api.manager.handle(id, event).await {
        Ok(view) => json_response(StatusCode::OK, &view),
        Err(e @ SessionError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, &e.to_string()),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn close_session(State(api): State<SessionApi>, Path(id): Path<Uuid>) -> impl IntoResponse {
    if api.manager.close(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "session not found").into_response()
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> axum::response::Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(value).unwrap_or_else(|_| "{}".into()),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "error": { "message": message } }).to_string(),
    )
        .into_response()
}
