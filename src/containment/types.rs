//! Containment types: policies, quarantine records, approvals and audit events

use crate::config::ContainmentConfig;
use crate::error::Error;
use crate::store::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the controller responds to a containment request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentPolicy {
    /// Record an audit event, never block
    Observe,
    /// Queue the action for a human decision
    #[default]
    Approve,
    /// Act immediately
    Auto,
}

impl std::fmt::Display for ContainmentPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observe => write!(f, "observe"),
            Self::Approve => write!(f, "approve"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for ContainmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observe" => Ok(Self::Observe),
            "approve" => Ok(Self::Approve),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown containment policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Memory,
    Agent,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Quarantine record lifecycle: active → released | deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineStatus {
    Active,
    Released,
    Deleted,
}

impl std::fmt::Display for QuarantineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Released => write!(f, "released"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for QuarantineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "released" => Ok(Self::Released),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown quarantine status: {}", other)),
        }
    }
}

/// Audited containment action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    QuarantineMemory,
    ReleaseMemory,
    QuarantineAgent,
    ReleaseAgent,
    Escalate,
    /// Resolution of a pending approval whose action is unknown
    Approve,
    Dismiss,
    DeleteMemory,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuarantineMemory => "quarantine_memory",
            Self::ReleaseMemory => "release_memory",
            Self::QuarantineAgent => "quarantine_agent",
            Self::ReleaseAgent => "release_agent",
            Self::Escalate => "escalate",
            Self::Approve => "approve",
            Self::Dismiss => "dismiss",
            Self::DeleteMemory => "delete_memory",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarantine_memory" => Ok(Self::QuarantineMemory),
            "release_memory" => Ok(Self::ReleaseMemory),
            "quarantine_agent" => Ok(Self::QuarantineAgent),
            "release_agent" => Ok(Self::ReleaseAgent),
            "escalate" => Ok(Self::Escalate),
            "approve" => Ok(Self::Approve),
            "dismiss" => Ok(Self::Dismiss),
            "delete_memory" => Ok(Self::DeleteMemory),
            other => Err(Error::InvalidInput(format!("unknown action kind: {}", other))),
        }
    }
}

/// Quarantine of one memory or agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub quarantine_id: String,
    pub target_id: String,
    pub target_type: TargetType,
    pub quarantined_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    pub status: QuarantineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_by: Option<String>,
    pub tenant: String,
    /// Operations refused while an agent is quarantined; empty for memories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_operations: Vec<String>,
}

impl QuarantineRecord {
    pub fn is_active(&self) -> bool {
        self.status == QuarantineStatus::Active
    }
}

/// Append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainmentEvent {
    pub id: String,
    pub action: ActionKind,
    pub target_id: String,
    pub target_type: TargetType,
    pub timestamp: DateTime<Utc>,
    /// Policy in force when the action was taken
    pub policy: ContainmentPolicy,
    /// Whether the action changed containment state
    pub enforced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    pub reason: String,
    pub tenant: String,
}

/// Action waiting for a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: String,
    pub action: ActionKind,
    pub target_id: String,
    pub target_type: TargetType,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub tenant: String,
}

/// A quarantine request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarantineRequest {
    pub target_id: String,
    pub reason: String,
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub initiated_by: Option<String>,
    /// Act immediately regardless of policy
    #[serde(default)]
    pub force: bool,
}

impl QuarantineRequest {
    pub fn new(target_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_incident(mut self, incident_id: impl Into<String>) -> Self {
        self.incident_id = Some(incident_id.into());
        self
    }

    pub fn with_initiator(mut self, user: impl Into<String>) -> Self {
        self.initiated_by = Some(user.into());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Outcome of a containment operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainmentResult {
    pub success: bool,
    pub message: String,
    pub action: ActionKind,
    pub target_id: String,
    /// The action was queued instead of executed
    pub requires_approval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<QuarantineRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ContainmentResult {
    pub fn failure(action: ActionKind, target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            action,
            target_id: target_id.into(),
            requires_approval: false,
            approval_id: None,
            record: None,
            event_id: None,
        }
    }

    pub(crate) fn success(action: ActionKind, target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            ..Self::failure(action, target_id, message)
        }
    }
}

/// Controller summary for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainmentStatus {
    pub policy: ContainmentPolicy,
    pub active_memory_quarantines: usize,
    pub active_agent_quarantines: usize,
    /// Ten most recent audit events, newest first
    pub recent_events: Vec<ContainmentEvent>,
    pub pending_approvals: usize,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Persisted containment store for one tenant
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ContainmentDocument {
    pub quarantined_memories: Vec<QuarantineRecord>,
    pub quarantined_agents: Vec<QuarantineRecord>,
    pub events: Vec<ContainmentEvent>,
    pub pending_approvals: Vec<PendingApproval>,
    /// Controller configuration at the last write
    #[serde(default)]
    pub config: ContainmentConfig,
    pub version: u64,
}

impl ContainmentDocument {
    pub fn records(&self, target_type: TargetType) -> &Vec<QuarantineRecord> {
        match target_type {
            TargetType::Memory => &self.quarantined_memories,
            TargetType::Agent => &self.quarantined_agents,
        }
    }

    pub fn records_mut(&mut self, target_type: TargetType) -> &mut Vec<QuarantineRecord> {
        match target_type {
            TargetType::Memory => &mut self.quarantined_memories,
            TargetType::Agent => &mut self.quarantined_agents,
        }
    }

    pub fn active_record(&self, target_type: TargetType, target_id: &str) -> Option<&QuarantineRecord> {
        self.records(target_type)
            .iter()
            .find(|r| r.is_active() && r.target_id == target_id)
    }
}

impl Document for ContainmentDocument {
    const COLLECTION: &'static str = "containment";

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
