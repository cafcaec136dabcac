//! HTTP handlers for the Containment API
//!
//! Provides 10 REST endpoints:
//! - GET    /api/v1/containment/status                 - controller summary
//! - GET    /api/v1/containment/quarantine             - quarantine records (`?target=&status=`)
//! - POST   /api/v1/containment/quarantine             - quarantine a memory or agent
//! - POST   /api/v1/containment/release                - release a quarantine
//! - POST   /api/v1/containment/delete                 - delete a quarantined memory
//! - GET    /api/v1/containment/approvals              - pending approvals
//! - POST   /api/v1/containment/approvals/:id/approve  - execute a pending action
//! - POST   /api/v1/containment/approvals/:id/dismiss  - drop a pending action
//! - GET    /api/v1/containment/events                 - audit trail (`?limit=`)
//! - GET    /api/v1/containment/agents/:id/blocked     - `?operation=` check

use crate::containment::types::*;
use crate::error::{error_response, to_json};
use crate::grid::{MemoryIntegrityGrid, DEFAULT_TENANT};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Shared state for containment handlers
#[derive(Clone)]
pub struct ContainmentState {
    pub grid: Arc<MemoryIntegrityGrid>,
}

/// Create the containment router
pub fn containment_router(state: ContainmentState) -> Router {
    Router::new()
        .route("/api/v1/containment/status", get(get_status))
        .route(
            "/api/v1/containment/quarantine",
            get(list_quarantined).post(quarantine),
        )
        .route("/api/v1/containment/release", post(release))
        .route("/api/v1/containment/delete", post(delete_memory))
        .route("/api/v1/containment/approvals", get(list_approvals))
        .route("/api/v1/containment/approvals/:id/approve", post(approve))
        .route("/api/v1/containment/approvals/:id/dismiss", post(dismiss))
        .route("/api/v1/containment/events", get(list_events))
        .route("/api/v1/containment/agents/:id/blocked", get(agent_blocked))
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
pub struct RecordQuery {
    pub tenant: Option<String>,
    pub target: Option<TargetType>,
    pub status: Option<QuarantineStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub tenant: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BlockedQuery {
    pub tenant: Option<String>,
    pub operation: String,
}

#[derive(Debug, Deserialize)]
pub struct QuarantineBody {
    #[serde(default)]
    pub tenant: Option<String>,
    pub target_type: TargetType,
    #[serde(flatten)]
    pub request: QuarantineRequest,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    #[serde(default)]
    pub tenant: Option<String>,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(default)]
    pub released_by: Option<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    #[serde(default)]
    pub tenant: Option<String>,
    pub target_id: String,
    #[serde(default)]
    pub deleted_by: Option<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    #[serde(default)]
    pub tenant: Option<String>,
    pub user: String,
    #[serde(default)]
    pub reason: String,
}

fn tenant_of(tenant: &Option<String>) -> &str {
    tenant.as_deref().unwrap_or(DEFAULT_TENANT)
}

/// 200 on success, 202 when queued for approval, 409 otherwise
fn result_response(result: ContainmentResult) -> (StatusCode, Json<serde_json::Value>) {
    let status = if result.requires_approval {
        StatusCode::ACCEPTED
    } else if result.success {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    (status, Json(to_json(result)))
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/v1/containment/status
async fn get_status(
    State(state): State<ContainmentState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    match state.grid.containment().get_status(tenant_of(&query.tenant)).await {
        Ok(status) => (StatusCode::OK, Json(to_json(status))),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/containment/quarantine
async fn list_quarantined(
    State(state): State<ContainmentState>,
    Query(query): Query<RecordQuery>,
) -> impl IntoResponse {
    let tenant = tenant_of(&query.tenant);
    let controller = state.grid.containment();
    let records = match query.target.unwrap_or(TargetType::Memory) {
        TargetType::Memory => controller.list_quarantined_memories(tenant, query.status).await,
        TargetType::Agent => controller.list_quarantined_agents(tenant, query.status).await,
    };
    match records {
        Ok(records) => (StatusCode::OK, Json(to_json(records))),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/containment/quarantine
async fn quarantine(
    State(state): State<ContainmentState>,
    Json(body): Json<QuarantineBody>,
) -> impl IntoResponse {
    match state
        .grid
        .quarantine(tenant_of(&body.tenant), body.target_type, body.request)
        .await
    {
        Ok(result) => result_response(result),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/containment/release
async fn release(
    State(state): State<ContainmentState>,
    Json(body): Json<ReleaseBody>,
) -> impl IntoResponse {
    match state
        .grid
        .release(
            tenant_of(&body.tenant),
            body.target_type,
            &body.target_id,
            body.released_by.as_deref(),
            &body.reason,
        )
        .await
    {
        Ok(result) => result_response(result),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/containment/delete
async fn delete_memory(
    State(state): State<ContainmentState>,
    Json(body): Json<DeleteBody>,
) -> impl IntoResponse {
    match state
        .grid
        .containment()
        .delete_quarantined_memory(
            tenant_of(&body.tenant),
            &body.target_id,
            body.deleted_by.as_deref(),
            &body.reason,
        )
        .await
    {
        Ok(result) => result_response(result),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/containment/approvals
async fn list_approvals(
    State(state): State<ContainmentState>,
    Query(query): Query<TenantQuery>,
) -> impl IntoResponse {
    match state
        .grid
        .containment()
        .list_pending_approvals(tenant_of(&query.tenant))
        .await
    {
        Ok(approvals) => (StatusCode::OK, Json(to_json(approvals))),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/containment/approvals/:id/approve
async fn approve(
    State(state): State<ContainmentState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> impl IntoResponse {
    match state
        .grid
        .containment()
        .approve_action(tenant_of(&body.tenant), &id, &body.user)
        .await
    {
        Ok(result) => result_response(result),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/containment/approvals/:id/dismiss
async fn dismiss(
    State(state): State<ContainmentState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> impl IntoResponse {
    match state
        .grid
        .containment()
        .dismiss_approval(tenant_of(&body.tenant), &id, &body.user, &body.reason)
        .await
    {
        Ok(result) => result_response(result),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/containment/events
async fn list_events(
    State(state): State<ContainmentState>,
    Query(query): Query<EventQuery>,
) -> impl IntoResponse {
    match state
        .grid
        .containment()
        .list_audit_events(tenant_of(&query.tenant), query.limit)
        .await
    {
        Ok(events) => (StatusCode::OK, Json(to_json(events))),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/containment/agents/:id/blocked
async fn agent_blocked(
    State(state): State<ContainmentState>,
    Path(id): Path<String>,
    Query(query): Query<BlockedQuery>,
) -> impl IntoResponse {
    match state
        .grid
        .containment()
        .is_agent_blocked(tenant_of(&query.tenant), &id, &query.operation)
        .await
    {
        Ok(blocked) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "agent_id": id,
                "operation": query.operation,
                "blocked": blocked,
            })),
        ),
        Err(e) => error_response(e),
    }
}
