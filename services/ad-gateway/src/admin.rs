//! Admin API for advertisement and API key management
//!
//! Runs on a separate listener port and provides the management surface the
//! core treats as external: ad CRUD with configuration validation, key CRUD
//! with enable/disable, manual quota correction, and a pool status summary.
//!
//! Endpoints:
//! - GET    /admin/ads               - list ads with play counts
//! - POST   /admin/ads               - create (validates configuration)
//! - PUT    /admin/ads/{id}          - replace (validates configuration)
//! - DELETE /admin/ads/{id}          - delete (cascades the play counter)
//! - POST   /admin/ads/{id}/toggle   - flip enabled
//! - GET    /admin/keys              - list keys, secrets omitted
//! - POST   /admin/keys              - add a key
//! - DELETE /admin/keys/{id}         - remove a key
//! - POST   /admin/keys/{id}/toggle  - flip enabled
//! - PUT    /admin/keys/{id}/quota   - overwrite recorded usage
//! - GET    /admin/pool              - rotator status summary

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use common::Secret;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use adbreak::{AdCatalog, AdKind, AdStore, Advertisement};
use keypool::ledger::{Credential, QuotaLedger};
use keypool::rotator::CredentialRotator;
use player::Platform;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub rotator: Arc<CredentialRotator>,
    pub ledger: Arc<QuotaLedger>,
    pub store: Arc<AdStore>,
    pub catalog: Arc<AdCatalog>,
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/ads", get(list_ads).post(create_ad))
        .route("/admin/ads/{id}", put(update_ad).delete(delete_ad))
        .route("/admin/ads/{id}/toggle", post(toggle_ad))
        .route("/admin/keys", get(list_keys).post(create_key))
        .route("/admin/keys/{id}", delete(delete_key))
        .route("/admin/keys/{id}/toggle", post(toggle_key))
        .route("/admin/keys/{id}/quota", put(set_key_quota))
        .route("/admin/pool", get(pool_status))
        .with_state(state)
}

fn json(status: StatusCode, body: serde_json::Value) -> axum::response::Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn error(status: StatusCode, message: &str) -> axum::response::Response {
    json(
        status,
        serde_json::json!({ "error": { "message": message } }),
    )
}

/// GET /admin/ads
async fn list_ads(State(state): State<AdminState>) -> impl IntoResponse {
    let (ads, counts) = state.store.snapshot().await;
    let entries: Vec<serde_json::Value> = ads
        .iter()
        .map(|ad| {
            serde_json::json!({
                "id": ad.id,
                "name": ad.name,
                "url": ad.url,
                "kind": ad.kind,
                "platform": ad.platform,
                "skip_after_secs": ad.skip_after_secs,
                "interval_secs": ad.interval_secs,
                "max_plays": ad.max_plays,
                "enabled": ad.enabled,
                "play_count": counts.get(&ad.id).copied().unwrap_or(0),
            })
        })
        .collect();
    json(StatusCode::OK, serde_json::json!({ "ads": entries }))
}

/// Request body for ad create/update.
#[derive(Deserialize)]
struct AdRequest {
    name: String,
    url: String,
    kind: AdKind,
    platform: Platform,
    #[serde(default)]
    skip_after_secs: u32,
    #[serde(default)]
    interval_secs: Option<u32>,
    #[serde(default)]
    max_plays: u64,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AdRequest {
    fn into_advertisement(self, id: Uuid) -> Advertisement {
        Advertisement {
            id,
            name: self.name,
            url: self.url,
            kind: self.kind,
            platform: self.platform,
            skip_after_secs: self.skip_after_secs,
            interval_secs: self.interval_secs,
            max_plays: self.max_plays,
            enabled: self.enabled,
        }
    }
}

/// POST /admin/ads
async fn create_ad(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<AdRequest>,
) -> impl IntoResponse {
    let ad = body.into_advertisement(Uuid::new_v4());
    if let Err(e) = state.store.insert(ad.clone()).await {
        return error(StatusCode::BAD_REQUEST, &e.to_string());
    }
    state.catalog.refresh().await;
    info!(ad_id = %ad.id, name = %ad.name, kind = ad.kind.label(), "advertisement created");
    json(StatusCode::CREATED, serde_json::json!({ "id": ad.id }))
}

/// PUT /admin/ads/{id}
async fn update_ad(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<AdRequest>,
) -> impl IntoResponse {
    if state.store.get(id).await.is_none() {
        return error(StatusCode::NOT_FOUND, "advertisement not found");
    }
    let ad = body.into_advertisement(id);
    if let Err(e) = state.store.insert(ad).await {
        return error(StatusCode::BAD_REQUEST, &e.to_string());
    }
    state.catalog.refresh().await;
    json(StatusCode::OK, serde_json::json!({ "id": id }))
}

/// DELETE /admin/ads/{id}
async fn delete_ad(State(state): State<AdminState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.store.remove(id).await {
        Ok(Some(_)) => {
            state.catalog.refresh().await;
            info!(ad_id = %id, "advertisement deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => error(StatusCode::NOT_FOUND, "advertisement not found"),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// POST /admin/ads/{id}/toggle
async fn toggle_ad(State(state): State<AdminState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(ad) = state.store.get(id).await else {
        return error(StatusCode::NOT_FOUND, "advertisement not found");
    };
    if let Err(e) = state.store.set_enabled(id, !ad.enabled).await {
        return error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }
    state.catalog.refresh().await;
    json(
        StatusCode::OK,
        serde_json::json!({ "id": id, "enabled": !ad.enabled }),
    )
}

/// GET /admin/keys - list without secret values.
async fn list_keys(State(state): State<AdminState>) -> impl IntoResponse {
    let entries: Vec<serde_json::Value> = state
        .ledger
        .list()
        .await
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id,
                "name": c.name,
                "enabled": c.enabled,
                "quota_used": c.quota_used,
                "quota_ceiling": keypool::QUOTA_CEILING,
                "last_used_at": c.last_used_at,
            })
        })
        .collect();
    json(StatusCode::OK, serde_json::json!({ "keys": entries }))
}

/// Request body for adding a key.
#[derive(Deserialize)]
struct KeyRequest {
    name: String,
    secret: String,
}

/// POST /admin/keys
async fn create_key(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<KeyRequest>,
) -> impl IntoResponse {
    if body.secret.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "secret must not be empty");
    }
    let credential = Credential {
        id: Uuid::new_v4(),
        name: body.name,
        secret: Secret::new(body.secret),
        enabled: true,
        quota_used: 0,
        last_used_at: None,
    };
    let id = credential.id;
    if let Err(e) = state.rotator.add(credential).await {
        return error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }
    info!(credential_id = %id, "api key added");
    json(StatusCode::CREATED, serde_json::json!({ "id": id }))
}

/// DELETE /admin/keys/{id}
async fn delete_key(State(state): State<AdminState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.rotator.remove(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(keypool::Error::NotFound(_)) => error(StatusCode::NOT_FOUND, "key not found"),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// POST /admin/keys/{id}/toggle
async fn toggle_key(State(state): State<AdminState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(credential) = state.ledger.get(id).await else {
        return error(StatusCode::NOT_FOUND, "key not found");
    };
    let result = if credential.enabled {
        state.rotator.disable(id).await
    } else {
        state.rotator.enable(id).await
    };
    match result {
        Ok(()) => json(
            StatusCode::OK,
            serde_json::json!({ "id": id, "enabled": !credential.enabled }),
        ),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// Request body for the quota correction endpoint.
#[derive(Deserialize)]
struct QuotaRequest {
    quota_used: u64,
}

/// PUT /admin/keys/{id}/quota - manual correction when the provider's
/// console shows a different number than the local estimate.
async fn set_key_quota(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<QuotaRequest>,
) -> impl IntoResponse {
    match state.rotator.set_quota(id, body.quota_used).await {
        Ok(()) => {
            info!(credential_id = %id, quota_used = body.quota_used, "quota corrected");
            json(
                StatusCode::OK,
                serde_json::json!({ "id": id, "quota_used": body.quota_used }),
            )
        }
        Err(keypool::Error::NotFound(_)) => error(StatusCode::NOT_FOUND, "key not found"),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// GET /admin/pool
async fn pool_status(State(state): State<AdminState>) -> impl IntoResponse {
    json(StatusCode::OK, state.rotator.health().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_state(dir: &tempfile::TempDir) -> AdminState {
        let ledger = Arc::new(
            QuotaLedger::load(dir.path().join("keys.json"))
                .await
                .unwrap(),
        );
        let rotator = Arc::new(CredentialRotator::load(ledger.clone()).await);
        let store = Arc::new(AdStore::load(dir.path().join("ads.json")).await.unwrap());
        let catalog = Arc::new(AdCatalog::load(store.clone()).await);
        AdminState {
            rotator,
            ledger,
            store,
            catalog,
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn valid_mid_roll() -> serde_json::Value {
        serde_json::json!({
            "name": "sponsor spot",
            "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "kind": "mid-roll",
            "platform": "youtube",
            "skip_after_secs": 5,
            "interval_secs": 300,
            "max_plays": 10
        })
    }

    #[tokio::test]
    async fn create_list_and_delete_ad() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(request("POST", "/admin/ads", Some(valid_mid_roll())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(request("GET", "/admin/ads", None))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["ads"].as_array().unwrap().len(), 1);
        assert_eq!(body["ads"][0]["play_count"], 0);
        assert_eq!(body["ads"][0]["kind"], "mid-roll");

        let response = router
            .clone()
            .oneshot(request("DELETE", &format!("/admin/ads/{id}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.store.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_mid_roll_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state.clone());

        let mut body = valid_mid_roll();
        body["interval_secs"] = serde_json::json!(10);
        let response = router
            .clone()
            .oneshot(request("POST", "/admin/ads", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err = body_json(response).await;
        assert!(
            err["error"]["message"]
                .as_str()
                .unwrap()
                .contains("at least 30s")
        );

        let mut body = valid_mid_roll();
        body.as_object_mut().unwrap().remove("interval_secs");
        let response = router
            .oneshot(request("POST", "/admin/ads", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.is_empty().await);
    }

    #[tokio::test]
    async fn created_ad_reaches_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state.clone());

        let body = serde_json::json!({
            "name": "pre",
            "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "kind": "pre-roll",
            "platform": "youtube",
            "skip_after_secs": 5
        });
        router
            .oneshot(request("POST", "/admin/ads", Some(body)))
            .await
            .unwrap();

        assert!(state.catalog.eligible_pre_roll().await.is_some());
    }

    #[tokio::test]
    async fn toggle_ad_flips_enabled_and_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state.clone());

        let body = serde_json::json!({
            "name": "pre",
            "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "kind": "pre-roll",
            "platform": "youtube"
        });
        let response = router
            .clone()
            .oneshot(request("POST", "/admin/ads", Some(body)))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(request("POST", &format!("/admin/ads/{id}/toggle"), None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["enabled"], false);
        assert!(state.catalog.eligible_pre_roll().await.is_none());
    }

    #[tokio::test]
    async fn update_unknown_ad_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state);

        let response = router
            .oneshot(request(
                "PUT",
                &format!("/admin/ads/{}", Uuid::new_v4()),
                Some(valid_mid_roll()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn key_lifecycle_and_secret_redaction() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(request(
                "POST",
                "/admin/keys",
                Some(serde_json::json!({"name": "primary", "secret": "AIza-super-secret"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        // Listing shows the key but never its secret
        let response = router
            .clone()
            .oneshot(request("GET", "/admin/keys", None))
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let raw = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(raw.contains("primary"));
        assert!(!raw.contains("AIza-super-secret"));

        // Toggle disables, pool reflects it
        let response = router
            .clone()
            .oneshot(request("POST", &format!("/admin/keys/{id}/toggle"), None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["enabled"], false);
        assert!(state.rotator.acquire().await.is_err());

        let response = router
            .clone()
            .oneshot(request("DELETE", &format!("/admin/keys/{id}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn empty_secret_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state);

        let response = router
            .oneshot(request(
                "POST",
                "/admin/keys",
                Some(serde_json::json!({"name": "empty", "secret": "   "})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn quota_correction_updates_pool() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(request(
                "POST",
                "/admin/keys",
                Some(serde_json::json!({"name": "k", "secret": "AIza-k"})),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(request(
                "PUT",
                &format!("/admin/keys/{id}/quota"),
                Some(serde_json::json!({"quota_used": 10000})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.rotator.acquire().await.is_err());

        let response = router
            .oneshot(request("GET", "/admin/pool", None))
            .await
            .unwrap();
        let pool = body_json(response).await;
        assert_eq!(pool["status"], "unhealthy");
        assert_eq!(pool["keys_exhausted"], 1);
    }

    #[tokio::test]
    async fn quota_correction_on_unknown_key_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = build_admin_router(state);

        let response = router
            .oneshot(request(
                "PUT",
                &format!("/admin/keys/{}/quota", Uuid::new_v4()),
                Some(serde_json::json!({"quota_used": 0})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
