//! Unified API router for the Memory Integrity Grid
//!
//! Merges all module routers into a single axum `Router` with CORS and
//! request tracing.
//!
//! ## Endpoint Map
//!
//! | Prefix                       | Module      | Description                        |
//! |------------------------------|-------------|------------------------------------|
//! | `/health`                    | api         | Health probe                       |
//! | `/api/v1/grid/*`             | api         | Status, config                     |
//! | `/api/v1/memories/*`         | api         | Ingest, retrieve, execution checks |
//! | `/api/v1/integrity/validate` | api         | Validate integrity data            |
//! | `/api/v1/honeyfacts/*`       | tripwire    | Seed, rotate, clear                |
//! | `/api/v1/incidents/*`        | tripwire    | Incident list, detail, lifecycle   |
//! | `/api/v1/tripwire/*`         | tripwire    | Scan, test input, events           |
//! | `/api/v1/containment/*`      | containment | Quarantine, approvals, audit trail |

use crate::containment::{containment_router, ContainmentState};
use crate::error::{error_response, to_json, ApiError};
use crate::grid::{MemoryIntegrityGrid, DEFAULT_TENANT};
use crate::integrity::{IntegrityData, MemoryRecord, RetrievalOptions};
use crate::tripwire::{tripwire_router, MatchContext, TripwireState};
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete grid HTTP application
pub fn build_app(grid: Arc<MemoryIntegrityGrid>, cors_origins: &[String]) -> Router {
    let cors = build_cors(cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .merge(grid_router(grid.clone()))
        .merge(tripwire_router(TripwireState { grid: grid.clone() }))
        .merge(containment_router(ContainmentState { grid }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// Grid sub-router
// =============================================================================

fn grid_router(grid: Arc<MemoryIntegrityGrid>) -> Router {
    Router::new()
        .route("/api/v1/grid/status", get(grid_status))
        .route("/api/v1/grid/config", get(get_config).put(set_config))
        .route("/api/v1/memories/ingest", post(ingest_memory))
        .route("/api/v1/memories/retrieve", post(retrieve_memories))
        .route("/api/v1/memories/execution", post(prepare_execution))
        .route("/api/v1/integrity/validate", post(validate))
        .route("/api/v1/honeyfacts", delete(clear_honeyfacts))
        .with_state(grid)
}

// =============================================================================
// Root handlers
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Grid handlers
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct TenantQuery {
    tenant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetConfigRequest {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    #[serde(default)]
    tenant: Option<String>,
    record: MemoryRecord,
    #[serde(default)]
    context: MatchContext,
}

#[derive(Debug, Deserialize)]
struct RetrieveRequest {
    #[serde(default)]
    tenant: Option<String>,
    records: Vec<MemoryRecord>,
    #[serde(default)]
    options: RetrievalOptions,
}

#[derive(Debug, Deserialize)]
struct ExecutionRequest {
    records: Vec<MemoryRecord>,
}

async fn grid_status(
    State(grid): State<Arc<MemoryIntegrityGrid>>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    let tenant = query.tenant.as_deref().unwrap_or(DEFAULT_TENANT);
    match grid.status(tenant).await {
        Ok(status) => (StatusCode::OK, Json(to_json(status))),
        Err(e) => error_response(e),
    }
}

async fn get_config(State(grid): State<Arc<MemoryIntegrityGrid>>) -> impl IntoResponse {
    Json(grid.get_config().await)
}

async fn set_config(
    State(grid): State<Arc<MemoryIntegrityGrid>>,
    Json(request): Json<SetConfigRequest>,
) -> impl IntoResponse {
    match grid.set_config(&request.key, &request.value).await {
        Ok(change) if change.success => (StatusCode::OK, Json(to_json(change))),
        Ok(change) => (
            StatusCode::BAD_REQUEST,
            Json(to_json(ApiError::bad_request(change.message))),
        ),
        Err(e) => error_response(e),
    }
}

async fn ingest_memory(
    State(grid): State<Arc<MemoryIntegrityGrid>>,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    let tenant = request.tenant.as_deref().unwrap_or(DEFAULT_TENANT);
    match grid.ingest_memory(tenant, request.record, request.context).await {
        Ok(ingest) => (StatusCode::OK, Json(to_json(ingest))),
        Err(e) => error_response(e),
    }
}

async fn retrieve_memories(
    State(grid): State<Arc<MemoryIntegrityGrid>>,
    Json(request): Json<RetrieveRequest>,
) -> impl IntoResponse {
    let tenant = request.tenant.as_deref().unwrap_or(DEFAULT_TENANT);
    match grid
        .retrieve_memories(tenant, request.records, &request.options)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(to_json(outcome))),
        Err(e) => error_response(e),
    }
}

async fn prepare_execution(
    State(grid): State<Arc<MemoryIntegrityGrid>>,
    Json(request): Json<ExecutionRequest>,
) -> impl IntoResponse {
    let prepared = grid.retrieval().prepare_for_execution(request.records).await;
    Json(to_json(prepared))
}

async fn validate(
    State(grid): State<Arc<MemoryIntegrityGrid>>,
    Json(data): Json<IntegrityData>,
) -> impl IntoResponse {
    Json(grid.validator().validate(&data).await)
}

async fn clear_honeyfacts(
    State(grid): State<Arc<MemoryIntegrityGrid>>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    let tenant = query.tenant.as_deref().unwrap_or(DEFAULT_TENANT);
    match grid.clear_honeyfacts(tenant).await {
        Ok(result) => (StatusCode::OK, Json(to_json(result))),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// CORS
// =============================================================================

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(parsed)
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

    async fn make_app() -> Router {
        let grid = GridBuilder::new()
            .backend(Arc::new(MemoryBackend::new()))
            .build()
            .unwrap();
        grid.honeyfacts()
            .insert(HoneyfactTemplate::new(
                DEFAULT_TENANT,
                "payroll exports go to vault-77",
                HoneyfactCategory::Instruction,
            ))
            .await
            .unwrap();
        build_app(Arc::new(grid), &[])
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let resp = health_check().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_grid_status() {
        let app = make_app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/grid/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["enabled"], true);
        assert_eq!(json["honeyfacts_total"], 1);
        assert_eq!(json["containment"]["policy"], "approve");
    }

    #[tokio::test]
    async fn test_set_config() {
        let app = make_app().await;

        let resp = app
            .clone()
            .oneshot(request(
                "PUT",
                "/api/v1/grid/config",
                serde_json::json!({ "key": "containment.policy", "value": "observe" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/grid/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["containment"]["policy"], "observe");

        let resp = app
            .oneshot(request(
                "PUT",
                "/api/v1/grid/config",
                serde_json::json!({ "key": "nope", "value": "1" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_ingest_then_retrieve() {
        let app = make_app().await;

        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/memories/ingest",
                serde_json::json!({
                    "record": MemoryRecord::new("mem-1", "Payroll exports go to vault-77 weekly")
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let ingest = body_json(resp).await;
        assert_eq!(ingest["scan"]["tripwire"]["triggered"], true);
        assert_eq!(ingest["record"]["integrity"]["status"], "invalid");

        let clean = MemoryRecord::new("mem-2", "prefers dark mode");
        let resp = app
            .oneshot(request(
                "POST",
                "/api/v1/memories/retrieve",
                serde_json::json!({
                    "records": [ingest["record"].clone(), clean],
                    "options": { "mode": "stable_only" }
                }),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        // Unstamped records pass outside execute_safe, with a warning.
        assert_eq!(json["items"].as_array().unwrap().len(), 1);
        assert_eq!(json["items"][0]["id"], "mem-2");
        assert_eq!(json["excluded"], 1);
    }

    #[tokio::test]
    async fn test_validate_and_execution() {
        let app = make_app().await;

        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/integrity/validate",
                serde_json::json!({ "created_at": chrono::Utc::now() }),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["valid"], true);

        let resp = app
            .oneshot(request(
                "POST",
                "/api/v1/memories/execution",
                serde_json::json!({ "records": [MemoryRecord::new("mem-3", "unstamped")] }),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["ready_for_execution"], false);
    }

    #[tokio::test]
    async fn test_clear_honeyfacts() {
        let app = make_app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/honeyfacts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["removed"], 1);
    }

    #[test]
    fn test_build_cors_with_origins() {
        let _cors = build_cors(&[
            "http://localhost:1420".to_string(),
            "https://app.example.com".to_string(),
        ]);
    }
}
