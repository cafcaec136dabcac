//! HTTP handlers for the Tripwire API
//!
//! Provides 9 REST endpoints:
//! - GET    /api/v1/incidents            - list incidents (`?status=&tenant=`)
//! - GET    /api/v1/incidents/stats      - incident statistics
//! - GET    /api/v1/incidents/:id        - incident detail
//! - PUT    /api/v1/incidents/:id        - move an incident through its lifecycle
//! - GET    /api/v1/tripwire/events      - all detection events
//! - POST   /api/v1/tripwire/scan        - scan content and run containment
//! - POST   /api/v1/tripwire/test        - dry-run scan, nothing recorded
//! - POST   /api/v1/honeyfacts/seed      - plant honeyfacts
//! - POST   /api/v1/honeyfacts/rotate    - expire and replace active honeyfacts

use crate::error::{error_response, to_json, ApiError};
use crate::grid::{MemoryIntegrityGrid, DEFAULT_TENANT};
use crate::tripwire::types::*;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Shared state for tripwire handlers
#[derive(Clone)]
pub struct TripwireState {
    pub grid: Arc<MemoryIntegrityGrid>,
}

/// Create the tripwire router
pub fn tripwire_router(state: TripwireState) -> Router {
    Router::new()
        .route("/api/v1/incidents", get(list_incidents))
        .route("/api/v1/incidents/stats", get(incident_stats))
        .route("/api/v1/incidents/:id", get(get_incident).put(update_incident))
        .route("/api/v1/tripwire/events", get(list_events))
        .route("/api/v1/tripwire/scan", post(scan))
        .route("/api/v1/tripwire/test", post(test_input))
        .route("/api/v1/honeyfacts/seed", post(seed))
        .route("/api/v1/honeyfacts/rotate", post(rotate))
        .with_state(state)
}

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    pub tenant: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncidentQuery {
    pub tenant: Option<String>,
    pub status: Option<IncidentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub content: String,
    #[serde(default = "default_source")]
    pub source: DetectionSource,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub context: MatchContext,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeedRequest {
    pub tenant: Option<String>,
    pub count: Option<usize>,
}

fn default_source() -> DetectionSource {
    DetectionSource::Output
}

fn tenant_of(tenant: &Option<String>) -> &str {
    tenant.as_deref().unwrap_or(DEFAULT_TENANT)
}

// =============================================================================
// Incident handlers
// =============================================================================

/// GET /api/v1/incidents
async fn list_incidents(
    State(state): State<TripwireState>,
    Query(query): Query<IncidentQuery>,
) -> impl IntoResponse {
    match state.grid.list_incidents(tenant_of(&query.tenant), query.status).await {
        Ok(incidents) => (StatusCode::OK, Json(to_json(incidents))),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/incidents/stats
async fn incident_stats(
    State(state): State<TripwireState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    match state.grid.monitor().incident_stats(tenant_of(&query.tenant)).await {
        Ok(stats) => (StatusCode::OK, Json(to_json(stats))),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/incidents/:id
async fn get_incident(
    State(state): State<TripwireState>,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    match state.grid.monitor().get_incident(tenant_of(&query.tenant), &id).await {
        Ok(Some(incident)) => (StatusCode::OK, Json(to_json(incident))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(to_json(ApiError::not_found(format!("Incident '{}' not found", id)))),
        ),
        Err(e) => error_response(e),
    }
}

/// PUT /api/v1/incidents/:id
async fn update_incident(
    State(state): State<TripwireState>,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(update): Json<IncidentUpdate>,
) -> impl IntoResponse {
    match state
        .grid
        .update_incident(tenant_of(&query.tenant), &id, update)
        .await
    {
        Ok(result) if result.success => (StatusCode::OK, Json(to_json(result))),
        Ok(result) => {
            let status = if result.message.contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::CONFLICT
            };
            (status, Json(to_json(result)))
        }
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/tripwire/events
async fn list_events(
    State(state): State<TripwireState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    match state
        .grid
        .monitor()
        .list_detection_events(tenant_of(&query.tenant))
        .await
    {
        Ok(events) => (StatusCode::OK, Json(to_json(events))),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Scan handlers
// =============================================================================

/// POST /api/v1/tripwire/scan
async fn scan(
    State(state): State<TripwireState>,
    Json(request): Json<ScanRequest>,
) -> impl IntoResponse {
    let tenant = tenant_of(&request.tenant);
    match state
        .grid
        .scan(&request.content, request.source, tenant, request.context)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(to_json(outcome))),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/tripwire/test
async fn test_input(
    State(state): State<TripwireState>,
    Json(request): Json<ScanRequest>,
) -> impl IntoResponse {
    let tenant = tenant_of(&request.tenant);
    match state
        .grid
        .test_input(tenant, &request.content, request.source)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(to_json(result))),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Honeyfact handlers
// =============================================================================

/// POST /api/v1/honeyfacts/seed
async fn seed(
    State(state): State<TripwireState>,
    Json(request): Json<SeedRequest>,
) -> impl IntoResponse {
    match state.grid.seed(tenant_of(&request.tenant), request.count).await {
        Ok(result) => (StatusCode::CREATED, Json(to_json(result))),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/honeyfacts/rotate
async fn rotate(
    State(state): State<TripwireState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    match state.grid.rotate(tenant_of(&query.tenant)).await {
        Ok(summary) => (StatusCode::OK, Json(to_json(summary))),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridBuilder;
    use crate::honeyfact::{HoneyfactCategory, HoneyfactTemplate};
    use crate::store::MemoryBackend;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const LEAK: &str = "sk-live-0123456789abcdef";

    async fn make_app() -> (Router, Arc<MemoryIntegrityGrid>) {
        let grid = Arc::new(
            GridBuilder::new()
                .backend(Arc::new(MemoryBackend::new()))
                .build()
                .unwrap(),
        );
        grid.honeyfacts()
            .insert(HoneyfactTemplate::new(
                DEFAULT_TENANT,
                LEAK,
                HoneyfactCategory::ApiKey,
            ))
            .await
            .unwrap();
        let app = tripwire_router(TripwireState { grid: grid.clone() });
        (app, grid)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_scan_creates_incident() {
        let (app, _grid) = make_app().await;

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/tripwire/scan",
                serde_json::json!({
                    "content": format!("the key is {}", LEAK),
                    "source": "output",
                    "context": { "session_id": "sess-1" }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["tripwire"]["triggered"], true);
        assert_eq!(json["tripwire"]["incident"]["severity"], "high");

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/incidents?status=open")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_clean_content() {
        let (app, _grid) = make_app().await;
        let resp = app
            .oneshot(post_json(
                "/api/v1/tripwire/test",
                serde_json::json!({ "content": "nothing to see here" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["triggered"], false);
        assert_eq!(json["source"], "output");
    }

    #[tokio::test]
    async fn test_dry_run_leaves_no_incident() {
        let (app, _grid) = make_app().await;
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/tripwire/test",
                serde_json::json!({ "content": LEAK }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["triggered"], true);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/incidents/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn test_get_incident_not_found() {
        let (app, _grid) = make_app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/incidents/inc-missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_update_incident_lifecycle() {
        let (app, grid) = make_app().await;
        let result = grid
            .monitor()
            .monitor_output(LEAK, DEFAULT_TENANT, MatchContext::default())
            .await
            .unwrap();
        let id = result.incident.unwrap().id;

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/v1/incidents/{}", id))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "status": "resolved",
                            "notes": "rotated the decoy",
                            "resolved_by": "ops"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["incident"]["status"], "resolved");
        assert_eq!(json["incident"]["resolved_by"], "ops");

        // Terminal incidents cannot be reopened.
        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/v1/incidents/{}", id))
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::json!({ "status": "open" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_stats_and_events() {
        let (app, grid) = make_app().await;
        grid
            .monitor()
            .monitor_output(LEAK, DEFAULT_TENANT, MatchContext::default())
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/incidents/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["detection_events"], 1);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tripwire/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["confidence"], 1.0);
    }

    #[tokio::test]
    async fn test_seed_and_rotate() {
        let (app, _grid) = make_app().await;

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/honeyfacts/seed",
                serde_json::json!({ "tenant": "acme", "count": 3 }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["seeded"].as_array().unwrap().len(), 3);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/honeyfacts/rotate?tenant=acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["expired"], 3);
    }

    #[tokio::test]
    async fn test_invalid_tenant_is_bad_request() {
        let (app, _grid) = make_app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/incidents?tenant=..%2Fetc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
