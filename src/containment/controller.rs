//! Containment controller
//!
//! Policy-gated quarantine workflow for memories and agents:
//!
//! ```text
//!                      ┌─ observe ─► audit event only
//! quarantine request ──┼─ approve ─► pending approval ─► approve_action ─┐
//!                      └─ auto ────────────────────────────────────────┴─► record + audit event
//! ```
//!
//! Every decision for a tenant happens inside one repository mutation, so
//! concurrent requests for the same target cannot both create an active
//! record.

use super::types::*;
use crate::config::ContainmentConfig;
use crate::error::{Error, Result};
use crate::store::{Backend, Mutation, Repository};
use crate::tripwire::{Incident, Severity};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Audit events returned by [`ContainmentController::get_status`]
const RECENT_EVENT_COUNT: usize = 10;

pub struct ContainmentController {
    repo: Repository<ContainmentDocument>,
    config: RwLock<ContainmentConfig>,
}

impl ContainmentController {
    pub fn new(backend: Arc<dyn Backend>, config: ContainmentConfig) -> Self {
        Self {
            repo: Repository::new(backend),
            config: RwLock::new(config),
        }
    }

    pub async fn config(&self) -> ContainmentConfig {
        self.config.read().await.clone()
    }

    /// Replace the process-wide containment configuration.
    pub async fn set_config(&self, config: ContainmentConfig) -> Result<()> {
        if config.default_agent_id.trim().is_empty() {
            return Err(Error::Config(
                "containment.default_agent_id must not be empty".to_string(),
            ));
        }
        tracing::info!(policy = %config.policy, "Containment configuration updated");
        *self.config.write().await = config;
        Ok(())
    }

    // =========================================================================
    // Quarantine / release
    // =========================================================================

    pub async fn quarantine_memory(
        &self,
        tenant: &str,
        request: QuarantineRequest,
    ) -> Result<ContainmentResult> {
        self.quarantine(tenant, TargetType::Memory, request).await
    }

    pub async fn quarantine_agent(
        &self,
        tenant: &str,
        request: QuarantineRequest,
    ) -> Result<ContainmentResult> {
        self.quarantine(tenant, TargetType::Agent, request).await
    }

    pub async fn release_memory(
        &self,
        tenant: &str,
        memory_id: &str,
        released_by: Option<&str>,
        reason: &str,
    ) -> Result<ContainmentResult> {
        self.close(
            tenant,
            TargetType::Memory,
            memory_id,
            released_by,
            reason,
            QuarantineStatus::Released,
        )
        .await
    }

    pub async fn release_agent(
        &self,
        tenant: &str,
        agent_id: &str,
        released_by: Option<&str>,
        reason: &str,
    ) -> Result<ContainmentResult> {
        self.close(
            tenant,
            TargetType::Agent,
            agent_id,
            released_by,
            reason,
            QuarantineStatus::Released,
        )
        .await
    }

    /// Mark an actively quarantined memory as deleted. Terminal.
    pub async fn delete_quarantined_memory(
        &self,
        tenant: &str,
        memory_id: &str,
        deleted_by: Option<&str>,
        reason: &str,
    ) -> Result<ContainmentResult> {
        self.close(
            tenant,
            TargetType::Memory,
            memory_id,
            deleted_by,
            reason,
            QuarantineStatus::Deleted,
        )
        .await
    }

    async fn quarantine(
        &self,
        tenant: &str,
        target_type: TargetType,
        request: QuarantineRequest,
    ) -> Result<ContainmentResult> {
        let config = self.config().await;
        let result = self
            .repo
            .mutate(tenant, |doc| {
                let mutation = decide_quarantine(doc, &config, tenant, target_type, &request);
                snapshot(doc, &config, mutation)
            })
            .await?;
        log_result(tenant, &result);
        Ok(result)
    }

    async fn close(
        &self,
        tenant: &str,
        target_type: TargetType,
        target_id: &str,
        closed_by: Option<&str>,
        reason: &str,
        status: QuarantineStatus,
    ) -> Result<ContainmentResult> {
        let config = self.config().await;
        let action = match (target_type, status) {
            (TargetType::Memory, QuarantineStatus::Deleted) => ActionKind::DeleteMemory,
            (TargetType::Memory, _) => ActionKind::ReleaseMemory,
            (TargetType::Agent, QuarantineStatus::Released) => ActionKind::ReleaseAgent,
            (TargetType::Agent, _) => {
                return Err(Error::InvalidInput(format!(
                    "agents cannot move to {} status",
                    status
                )))
            }
        };

        let result = self
            .repo
            .mutate(tenant, |doc| {
                let now = Utc::now();
                let Some(record) = doc
                    .records_mut(target_type)
                    .iter_mut()
                    .find(|r| r.is_active() && r.target_id == target_id)
                else {
                    return Mutation::Discard(ContainmentResult::failure(
                        action,
                        target_id,
                        format!("{} {} is not in quarantine", capitalized(target_type), target_id),
                    ));
                };

                record.status = status;
                record.released_at = Some(now);
                record.released_by = closed_by.map(String::from);
                let closed = record.clone();

                let event = audit_event(
                    tenant,
                    config.policy,
                    action,
                    target_type,
                    target_id,
                    true,
                    closed_by.map(String::from),
                    closed.incident_id.clone(),
                    reason,
                );
                let mut result = ContainmentResult::success(
                    action,
                    target_id,
                    format!("{} {} is now {}", capitalized(target_type), target_id, status),
                );
                result.event_id = Some(event.id.clone());
                result.record = Some(closed);
                doc.events.push(event);
                snapshot(doc, &config, Mutation::Commit(result))
            })
            .await?;
        log_result(tenant, &result);
        Ok(result)
    }

    // =========================================================================
    // Approval queue
    // =========================================================================

    /// Execute a pending action. The approval is consumed even if the action
    /// itself fails, e.g. because the target was quarantined meanwhile.
    pub async fn approve_action(
        &self,
        tenant: &str,
        approval_id: &str,
        approver: &str,
    ) -> Result<ContainmentResult> {
        let config = self.config().await;
        let result = self
            .repo
            .mutate(tenant, |doc| {
                let Some(index) = doc.pending_approvals.iter().position(|a| a.id == approval_id)
                else {
                    return Mutation::Discard(ContainmentResult::failure(
                        ActionKind::Approve,
                        approval_id,
                        format!("Approval {} not found or already handled", approval_id),
                    ));
                };
                let approval = doc.pending_approvals.remove(index);
                let request = QuarantineRequest {
                    target_id: approval.target_id.clone(),
                    reason: approval.reason.clone(),
                    incident_id: approval.incident_id.clone(),
                    initiated_by: Some(approver.to_string()),
                    force: true,
                };
                let mut result = match decide_quarantine(doc, &config, tenant, approval.target_type, &request) {
                    Mutation::Commit(r) | Mutation::Discard(r) => r,
                };
                result.approval_id = Some(approval.id);
                snapshot(doc, &config, Mutation::Commit(result))
            })
            .await?;
        log_result(tenant, &result);
        Ok(result)
    }

    /// Drop a pending action without executing it.
    pub async fn dismiss_approval(
        &self,
        tenant: &str,
        approval_id: &str,
        dismissed_by: &str,
        reason: &str,
    ) -> Result<ContainmentResult> {
        let config = self.config().await;
        let result = self
            .repo
            .mutate(tenant, |doc| {
                let Some(index) = doc.pending_approvals.iter().position(|a| a.id == approval_id)
                else {
                    return Mutation::Discard(ContainmentResult::failure(
                        ActionKind::Dismiss,
                        approval_id,
                        format!("Approval {} not found or already handled", approval_id),
                    ));
                };
                let approval = doc.pending_approvals.remove(index);
                let event = audit_event(
                    tenant,
                    config.policy,
                    ActionKind::Dismiss,
                    approval.target_type,
                    &approval.target_id,
                    false,
                    Some(dismissed_by.to_string()),
                    approval.incident_id.clone(),
                    reason,
                );
                let mut result = ContainmentResult::success(
                    ActionKind::Dismiss,
                    &approval.target_id,
                    format!("Dismissed {} of {}", approval.action, approval.target_id),
                );
                result.approval_id = Some(approval.id);
                result.event_id = Some(event.id.clone());
                doc.events.push(event);
                snapshot(doc, &config, Mutation::Commit(result))
            })
            .await?;
        log_result(tenant, &result);
        Ok(result)
    }

    // =========================================================================
    // Incident response
    // =========================================================================

    /// Contain the memories referenced by an incident and, for critical
    /// incidents, the originating agent. Returns one result per target.
    pub async fn handle_incident(&self, incident: &Incident) -> Result<Vec<ContainmentResult>> {
        let config = self.config().await;
        let tenant = incident.tenant.as_str();
        let force = config.policy == ContainmentPolicy::Auto
            && incident.severity >= config.auto_quarantine_threshold;
        let reason = format!("{} severity honeyfact incident {}", incident.severity, incident.id);

        let mut results = Vec::new();
        for memory_id in incident.memory_ids() {
            let request = QuarantineRequest::new(memory_id, reason.clone())
                .with_incident(incident.id.clone())
                .with_force(force);
            results.push(self.quarantine_memory(tenant, request).await?);
        }

        if incident.severity == Severity::Critical && config.auto_escalate_critical {
            let agent_id = incident
                .origin_session()
                .unwrap_or(config.default_agent_id.as_str())
                .to_string();
            let request = QuarantineRequest::new(agent_id.clone(), reason.clone())
                .with_incident(incident.id.clone())
                .with_force(force);
            results.push(self.quarantine_agent(tenant, request).await?);
            self.record_escalation(tenant, &agent_id, incident, &config).await?;
        }

        tracing::info!(
            tenant,
            incident_id = %incident.id,
            severity = %incident.severity,
            targets = results.len(),
            "Incident handled"
        );
        Ok(results)
    }

    async fn record_escalation(
        &self,
        tenant: &str,
        agent_id: &str,
        incident: &Incident,
        config: &ContainmentConfig,
    ) -> Result<()> {
        self.repo
            .mutate(tenant, |doc| {
                doc.events.push(audit_event(
                    tenant,
                    config.policy,
                    ActionKind::Escalate,
                    TargetType::Agent,
                    agent_id,
                    false,
                    None,
                    Some(incident.id.clone()),
                    "critical incident escalated",
                ));
                snapshot(doc, config, Mutation::Commit(()))
            })
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_status(&self, tenant: &str) -> Result<ContainmentStatus> {
        let config = self.config().await;
        let doc = self.repo.load(tenant).await?;
        Ok(ContainmentStatus {
            policy: config.policy,
            active_memory_quarantines: doc.quarantined_memories.iter().filter(|r| r.is_active()).count(),
            active_agent_quarantines: doc.quarantined_agents.iter().filter(|r| r.is_active()).count(),
            recent_events: doc.events.iter().rev().take(RECENT_EVENT_COUNT).cloned().collect(),
            pending_approvals: doc.pending_approvals.len(),
            last_event_at: doc.events.last().map(|e| e.timestamp),
        })
    }

    pub async fn list_quarantined_memories(
        &self,
        tenant: &str,
        status: Option<QuarantineStatus>,
    ) -> Result<Vec<QuarantineRecord>> {
        self.list_records(tenant, TargetType::Memory, status).await
    }

    pub async fn list_quarantined_agents(
        &self,
        tenant: &str,
        status: Option<QuarantineStatus>,
    ) -> Result<Vec<QuarantineRecord>> {
        self.list_records(tenant, TargetType::Agent, status).await
    }

    async fn list_records(
        &self,
        tenant: &str,
        target_type: TargetType,
        status: Option<QuarantineStatus>,
    ) -> Result<Vec<QuarantineRecord>> {
        let mut doc = self.repo.load(tenant).await?;
        let records = std::mem::take(doc.records_mut(target_type));
        Ok(records
            .into_iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .collect())
    }

    pub async fn list_pending_approvals(&self, tenant: &str) -> Result<Vec<PendingApproval>> {
        Ok(self.repo.load(tenant).await?.pending_approvals)
    }

    /// Audit trail, newest first.
    pub async fn list_audit_events(
        &self,
        tenant: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ContainmentEvent>> {
        let doc = self.repo.load(tenant).await?;
        Ok(doc
            .events
            .into_iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    pub async fn is_memory_quarantined(&self, tenant: &str, memory_id: &str) -> Result<bool> {
        let doc = self.repo.load(tenant).await?;
        Ok(doc.active_record(TargetType::Memory, memory_id).is_some())
    }

    /// Whether `operation` is refused for `agent_id`.
    pub async fn is_agent_blocked(&self, tenant: &str, agent_id: &str, operation: &str) -> Result<bool> {
        let doc = self.repo.load(tenant).await?;
        Ok(doc
            .active_record(TargetType::Agent, agent_id)
            .is_some_and(|r| r.blocked_operations.iter().any(|op| op == operation)))
    }
}

/// Decide a quarantine request against the current document.
fn decide_quarantine(
    doc: &mut ContainmentDocument,
    config: &ContainmentConfig,
    tenant: &str,
    target_type: TargetType,
    request: &QuarantineRequest,
) -> Mutation<ContainmentResult> {
    let action = match target_type {
        TargetType::Memory => ActionKind::QuarantineMemory,
        TargetType::Agent => ActionKind::QuarantineAgent,
    };
    let target_id = request.target_id.as_str();

    if doc.active_record(target_type, target_id).is_some() {
        return Mutation::Discard(ContainmentResult::failure(
            action,
            target_id,
            format!("{} {} is already in quarantine", capitalized(target_type), target_id),
        ));
    }

    let policy = if request.force {
        ContainmentPolicy::Auto
    } else {
        config.policy
    };

    match policy {
        ContainmentPolicy::Observe => {
            let event = audit_event(
                tenant,
                config.policy,
                action,
                target_type,
                target_id,
                false,
                request.initiated_by.clone(),
                request.incident_id.clone(),
                &request.reason,
            );
            let mut result = ContainmentResult::success(
                action,
                target_id,
                format!("Observed {} of {} (policy=observe)", action, target_id),
            );
            result.event_id = Some(event.id.clone());
            doc.events.push(event);
            Mutation::Commit(result)
        }
        ContainmentPolicy::Approve => {
            if let Some(existing) = doc
                .pending_approvals
                .iter()
                .find(|a| a.action == action && a.target_id == target_id)
            {
                return Mutation::Discard(ContainmentResult::failure(
                    action,
                    target_id,
                    format!("{} of {} is already awaiting approval {}", action, target_id, existing.id),
                ));
            }
            let approval = PendingApproval {
                id: format!("apr-{}", uuid::Uuid::new_v4()),
                action,
                target_id: target_id.to_string(),
                target_type,
                reason: request.reason.clone(),
                incident_id: request.incident_id.clone(),
                requested_by: request.initiated_by.clone(),
                created_at: Utc::now(),
                tenant: tenant.to_string(),
            };
            let mut result = ContainmentResult::success(
                action,
                target_id,
                format!("{} of {} awaits approval {}", action, target_id, approval.id),
            );
            result.requires_approval = true;
            result.approval_id = Some(approval.id.clone());
            doc.pending_approvals.push(approval);
            Mutation::Commit(result)
        }
        ContainmentPolicy::Auto => {
            let record = QuarantineRecord {
                quarantine_id: format!("qr-{}", uuid::Uuid::new_v4()),
                target_id: target_id.to_string(),
                target_type,
                quarantined_at: Utc::now(),
                reason: request.reason.clone(),
                incident_id: request.incident_id.clone(),
                status: QuarantineStatus::Active,
                released_at: None,
                released_by: None,
                tenant: tenant.to_string(),
                blocked_operations: match target_type {
                    TargetType::Agent => config.blocked_operations.clone(),
                    TargetType::Memory => Vec::new(),
                },
            };
            let event = audit_event(
                tenant,
                config.policy,
                action,
                target_type,
                target_id,
                true,
                request.initiated_by.clone(),
                request.incident_id.clone(),
                &request.reason,
            );
            let mut result = ContainmentResult::success(
                action,
                target_id,
                format!("{} {} quarantined", capitalized(target_type), target_id),
            );
            result.event_id = Some(event.id.clone());
            result.record = Some(record.clone());
            doc.records_mut(target_type).push(record);
            doc.events.push(event);
            Mutation::Commit(result)
        }
    }
}

/// Store the controller configuration alongside committed changes.
fn snapshot<R>(doc: &mut ContainmentDocument, config: &ContainmentConfig, mutation: Mutation<R>) -> Mutation<R> {
    if let Mutation::Commit(_) = &mutation {
        doc.config = config.clone();
    }
    mutation
}

#[allow(clippy::too_many_arguments)]
fn audit_event(
    tenant: &str,
    policy: ContainmentPolicy,
    action: ActionKind,
    target_type: TargetType,
    target_id: &str,
    enforced: bool,
    initiated_by: Option<String>,
    incident_id: Option<String>,
    reason: &str,
) -> ContainmentEvent {
    ContainmentEvent {
        id: format!("cev-{}", uuid::Uuid::new_v4()),
        action,
        target_id: target_id.to_string(),
        target_type,
        timestamp: Utc::now(),
        policy,
        enforced,
        initiated_by,
        incident_id,
        reason: reason.to_string(),
        tenant: tenant.to_string(),
    }
}

fn capitalized(target_type: TargetType) -> &'static str {
    match target_type {
        TargetType::Memory => "Memory",
        TargetType::Agent => "Agent",
    }
}

fn log_result(tenant: &str, result: &ContainmentResult) {
    if result.success {
        tracing::info!(
            tenant,
            action = %result.action,
            target_id = %result.target_id,
            requires_approval = result.requires_approval,
            "{}",
            result.message
        );
    } else {
        tracing::warn!(
            tenant,
            action = %result.action,
            target_id = %result.target_id,
            "{}",
            result.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileBackend, MemoryBackend};
    use crate::tripwire::{DetectionEvent, DetectionSource, IncidentKind, IncidentStatus, MatchContext};
    use tempfile::TempDir;

    fn controller(policy: ContainmentPolicy) -> ContainmentController {
        ContainmentController::new(
            Arc::new(MemoryBackend::new()),
            ContainmentConfig {
                policy,
                ..Default::default()
            },
        )
    }

    fn incident(severity: Severity, memory_ids: &[&str], session: Option<&str>) -> Incident {
        let events = memory_ids
            .iter()
            .map(|id| DetectionEvent {
                id: format!("det-{}", id),
                timestamp: Utc::now(),
                honeyfact_id: "hf-1".to_string(),
                source: DetectionSource::MemoryWrite,
                confidence: 1.0,
                matched_text: "decoy".to_string(),
                snippet: "decoy".to_string(),
                context: MatchContext {
                    memory_id: Some(id.to_string()),
                    session_id: session.map(String::from),
                    ..Default::default()
                },
                tenant: "acme".to_string(),
            })
            .collect();
        Incident {
            id: "inc-42".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            severity,
            kind: IncidentKind::HoneyfactLeak,
            events,
            status: IncidentStatus::Open,
            tenant: "acme".to_string(),
            resolution_notes: None,
            resolved_by: None,
        }
    }

    #[tokio::test]
    async fn test_approve_policy_queues_then_executes() {
        let c = controller(ContainmentPolicy::Approve);
        let result = c
            .quarantine_memory("acme", QuarantineRequest::new("mem-1", "suspicious"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.requires_approval);
        assert!(!c.is_memory_quarantined("acme", "mem-1").await.unwrap());
        assert_eq!(c.list_pending_approvals("acme").await.unwrap().len(), 1);

        let approval_id = result.approval_id.unwrap();
        let approved = c.approve_action("acme", &approval_id, "alice").await.unwrap();
        assert!(approved.success);
        assert!(!approved.requires_approval);
        assert!(c.is_memory_quarantined("acme", "mem-1").await.unwrap());
        assert!(c.list_pending_approvals("acme").await.unwrap().is_empty());

        let events = c.list_audit_events("acme", None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].initiated_by.as_deref(), Some("alice"));
        assert!(events[0].enforced);

        // Consumed exactly once.
        let again = c.approve_action("acme", &approval_id, "alice").await.unwrap();
        assert!(!again.success);
        assert_eq!(again.action, ActionKind::Approve);
        let dismissed = c.dismiss_approval("acme", &approval_id, "bob", "late").await.unwrap();
        assert!(!dismissed.success);
    }

    #[tokio::test]
    async fn test_release_unknown_memory_fails() {
        let c = controller(ContainmentPolicy::Auto);
        let result = c
            .release_memory("acme", "mem-never", Some("alice"), "cleanup")
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("not in quarantine"));
        assert!(c.list_audit_events("acme", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_critical_incident_under_auto_contains_memory_and_agent() {
        let c = controller(ContainmentPolicy::Auto);
        let results = c
            .handle_incident(&incident(Severity::Critical, &["mem-7"], Some("sess-3")))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && !r.requires_approval));

        assert!(c.is_memory_quarantined("acme", "mem-7").await.unwrap());
        let agents = c
            .list_quarantined_agents("acme", Some(QuarantineStatus::Active))
            .await
            .unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].target_id, "sess-3");
        assert!(c.is_agent_blocked("acme", "sess-3", "tool_call").await.unwrap());
        assert!(!c.is_agent_blocked("acme", "sess-3", "read_docs").await.unwrap());

        let events = c.list_audit_events("acme", None).await.unwrap();
        let quarantine_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.action, ActionKind::QuarantineMemory | ActionKind::QuarantineAgent))
            .collect();
        assert_eq!(quarantine_events.len(), 2);
        assert!(quarantine_events
            .iter()
            .all(|e| e.incident_id.as_deref() == Some("inc-42")));
        assert!(events.iter().any(|e| e.action == ActionKind::Escalate));
    }

    #[tokio::test]
    async fn test_critical_incident_without_session_uses_default_agent() {
        let c = controller(ContainmentPolicy::Auto);
        c.handle_incident(&incident(Severity::Critical, &["mem-1"], None))
            .await
            .unwrap();
        let agents = c.list_quarantined_agents("acme", None).await.unwrap();
        assert_eq!(agents[0].target_id, "unknown-agent");
    }

    #[tokio::test]
    async fn test_auto_below_threshold_uses_normal_path() {
        let c = controller(ContainmentPolicy::Auto);
        let results = c
            .handle_incident(&incident(Severity::Medium, &["mem-1", "mem-2", "mem-1"], None))
            .await
            .unwrap();
        // Distinct memories only; auto policy still quarantines them directly.
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && !r.requires_approval));
        assert_eq!(c.list_quarantined_agents("acme", None).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_incident_under_approve_policy_is_queued() {
        let c = controller(ContainmentPolicy::Approve);
        let results = c
            .handle_incident(&incident(Severity::Critical, &["mem-1"], Some("sess-1")))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.requires_approval));
        assert_eq!(c.list_pending_approvals("acme").await.unwrap().len(), 2);
        assert!(!c.is_memory_quarantined("acme", "mem-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_observe_policy_only_audits() {
        let c = controller(ContainmentPolicy::Observe);
        let result = c
            .quarantine_agent("acme", QuarantineRequest::new("agent-1", "noisy"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(!result.requires_approval);
        assert!(result.record.is_none());
        assert!(c.list_quarantined_agents("acme", None).await.unwrap().is_empty());

        let events = c.list_audit_events("acme", None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].enforced);
        assert_eq!(events[0].policy, ContainmentPolicy::Observe);
    }

    #[tokio::test]
    async fn test_force_overrides_policy() {
        let c = controller(ContainmentPolicy::Observe);
        let result = c
            .quarantine_memory(
                "acme",
                QuarantineRequest::new("mem-1", "manual").with_force(true),
            )
            .await
            .unwrap();
        assert!(result.record.is_some());
        assert!(c.is_memory_quarantined("acme", "mem-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_quarantine_is_rejected() {
        let c = controller(ContainmentPolicy::Auto);
        let first = c
            .quarantine_memory("acme", QuarantineRequest::new("mem-1", "leak"))
            .await
            .unwrap();
        assert!(first.success);
        let second = c
            .quarantine_memory("acme", QuarantineRequest::new("mem-1", "leak again"))
            .await
            .unwrap();
        assert!(!second.success);
        assert!(second.message.contains("already in quarantine"));
        assert_eq!(c.list_quarantined_memories("acme", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_release_then_quarantine_again() {
        let c = controller(ContainmentPolicy::Auto);
        c.quarantine_memory("acme", QuarantineRequest::new("mem-1", "leak"))
            .await
            .unwrap();
        let released = c
            .release_memory("acme", "mem-1", Some("alice"), "false alarm")
            .await
            .unwrap();
        assert!(released.success);
        let record = released.record.unwrap();
        assert_eq!(record.status, QuarantineStatus::Released);
        assert_eq!(record.released_by.as_deref(), Some("alice"));

        let again = c
            .quarantine_memory("acme", QuarantineRequest::new("mem-1", "leaked twice"))
            .await
            .unwrap();
        assert!(again.success);
        let records = c.list_quarantined_memories("acme", None).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().filter(|r| r.is_active()).count(), 1);
    }

    #[tokio::test]
    async fn test_delete_quarantined_memory() {
        let c = controller(ContainmentPolicy::Auto);
        c.quarantine_memory("acme", QuarantineRequest::new("mem-1", "leak"))
            .await
            .unwrap();
        let deleted = c
            .delete_quarantined_memory("acme", "mem-1", Some("alice"), "purge")
            .await
            .unwrap();
        assert!(deleted.success);
        assert_eq!(deleted.action, ActionKind::DeleteMemory);
        assert!(!c.is_memory_quarantined("acme", "mem-1").await.unwrap());

        let release = c.release_memory("acme", "mem-1", None, "undo").await.unwrap();
        assert!(!release.success);
        let deleted = c
            .list_quarantined_memories("acme", Some(QuarantineStatus::Deleted))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_logs_event() {
        let c = controller(ContainmentPolicy::Approve);
        let pending = c
            .quarantine_memory("acme", QuarantineRequest::new("mem-1", "maybe"))
            .await
            .unwrap();
        let approval_id = pending.approval_id.unwrap();

        let dismissed = c
            .dismiss_approval("acme", &approval_id, "bob", "benign")
            .await
            .unwrap();
        assert!(dismissed.success);
        assert!(c.list_pending_approvals("acme").await.unwrap().is_empty());

        let events = c.list_audit_events("acme", Some(5)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActionKind::Dismiss);
        assert_eq!(events[0].reason, "benign");

        let approve = c.approve_action("acme", &approval_id, "alice").await.unwrap();
        assert!(!approve.success);
    }

    #[tokio::test]
    async fn test_duplicate_pending_approval_is_rejected() {
        let c = controller(ContainmentPolicy::Approve);
        c.quarantine_memory("acme", QuarantineRequest::new("mem-1", "a"))
            .await
            .unwrap();
        let second = c
            .quarantine_memory("acme", QuarantineRequest::new("mem-1", "b"))
            .await
            .unwrap();
        assert!(!second.success);
        assert_eq!(c.list_pending_approvals("acme").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status() {
        let c = controller(ContainmentPolicy::Auto);
        for i in 0..12 {
            c.quarantine_memory("acme", QuarantineRequest::new(format!("mem-{}", i), "leak"))
                .await
                .unwrap();
        }
        c.quarantine_agent("acme", QuarantineRequest::new("agent-1", "leak"))
            .await
            .unwrap();

        let status = c.get_status("acme").await.unwrap();
        assert_eq!(status.policy, ContainmentPolicy::Auto);
        assert_eq!(status.active_memory_quarantines, 12);
        assert_eq!(status.active_agent_quarantines, 1);
        assert_eq!(status.recent_events.len(), 10);
        assert_eq!(status.recent_events[0].target_id, "agent-1");
        assert_eq!(status.pending_approvals, 0);
        assert_eq!(status.last_event_at, Some(status.recent_events[0].timestamp));
    }

    #[tokio::test]
    async fn test_concurrent_quarantines_leave_one_active_record() {
        let dir = TempDir::new().unwrap();
        let c = Arc::new(ContainmentController::new(
            Arc::new(FileBackend::new(dir.path().to_path_buf())),
            ContainmentConfig {
                policy: ContainmentPolicy::Auto,
                ..Default::default()
            },
        ));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let c = c.clone();
                tokio::spawn(async move {
                    c.quarantine_memory("acme", QuarantineRequest::new("mem-1", format!("race {}", i)))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().success {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        let active = c
            .list_quarantined_memories("acme", Some(QuarantineStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_config_snapshot_is_persisted() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let c = ContainmentController::new(backend.clone(), ContainmentConfig::default());
        c.set_config(ContainmentConfig {
            policy: ContainmentPolicy::Auto,
            ..Default::default()
        })
        .await
        .unwrap();
        c.quarantine_memory("acme", QuarantineRequest::new("mem-1", "leak"))
            .await
            .unwrap();

        let doc = Repository::<ContainmentDocument>::new(backend)
            .load("acme")
            .await
            .unwrap();
        assert_eq!(doc.config.policy, ContainmentPolicy::Auto);
        assert_eq!(doc.version, 1);

        let err = c
            .set_config(ContainmentConfig {
                default_agent_id: String::new(),
                ..Default::default()
            })
            .await;
        assert!(err.is_err());
    }
}
