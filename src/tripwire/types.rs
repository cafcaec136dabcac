//! Tripwire wire types: detection events, incidents and the incident store

use crate::store::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where the inspected text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Model output shown to a user
    Output,
    /// Arguments of a tool call issued by the agent
    ToolCall,
    /// Result returned by a tool
    ToolResult,
    /// Content written into the memory store
    MemoryWrite,
    /// Traffic leaving the system boundary
    External,
}

impl DetectionSource {
    pub const ALL: [DetectionSource; 5] = [
        Self::Output,
        Self::ToolCall,
        Self::ToolResult,
        Self::MemoryWrite,
        Self::External,
    ];
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Output => write!(f, "output"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
            Self::MemoryWrite => write!(f, "memory_write"),
            Self::External => write!(f, "external"),
        }
    }
}

impl std::str::FromStr for DetectionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "output" => Ok(Self::Output),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "memory_write" => Ok(Self::MemoryWrite),
            "external" => Ok(Self::External),
            other => Err(format!("unknown detection source: {}", other)),
        }
    }
}

/// Incident severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Incident lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Contained,
    Resolved,
    FalsePositive,
}

impl IncidentStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::FalsePositive)
    }

    /// Position along open → investigating → contained → resolved
    fn rank(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Investigating => 1,
            Self::Contained => 2,
            Self::Resolved => 3,
            Self::FalsePositive => 4,
        }
    }

    /// Forward moves along the lifecycle, or a non-terminal incident being
    /// dismissed as a false positive.
    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::FalsePositive => true,
            Self::Open => false,
            _ => next.rank() > self.rank(),
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Investigating => write!(f, "investigating"),
            Self::Contained => write!(f, "contained"),
            Self::Resolved => write!(f, "resolved"),
            Self::FalsePositive => write!(f, "false_positive"),
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "investigating" => Ok(Self::Investigating),
            "contained" => Ok(Self::Contained),
            "resolved" => Ok(Self::Resolved),
            "false_positive" => Ok(Self::FalsePositive),
            other => Err(format!("unknown incident status: {}", other)),
        }
    }
}

/// How the leak was recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// At least one template appeared verbatim
    HoneyfactLeak,
    /// Only approximate matches were found
    FuzzyHoneyfactLeak,
}

/// Caller-supplied context around the scanned content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Free-form scalar attributes from the integration boundary
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl MatchContext {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }
}

/// One honeyfact sighting. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub honeyfact_id: String,
    pub source: DetectionSource,
    /// 1.0 for exact matches, the window similarity for fuzzy ones
    pub confidence: f64,
    /// The text that matched
    pub matched_text: String,
    /// The match with surrounding content
    pub snippet: String,
    pub context: MatchContext,
    pub tenant: String,
}

/// A detected leak, grouping the events of one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub severity: Severity,
    pub kind: IncidentKind,
    pub events: Vec<DetectionEvent>,
    pub status: IncidentStatus,
    pub tenant: String,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
}

impl Incident {
    /// Distinct memory ids referenced by the events, in first-seen order
    pub fn memory_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.events.iter().filter_map(|e| e.context.memory_id.as_ref()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Session of the first event, if any
    pub fn origin_session(&self) -> Option<&str> {
        self.events
            .first()
            .and_then(|e| e.context.session_id.as_deref())
    }
}

/// Result of one tripwire scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripwireResult {
    pub triggered: bool,
    pub source: DetectionSource,
    pub events: Vec<DetectionEvent>,
    pub incident: Option<Incident>,
}

impl TripwireResult {
    pub fn untriggered(source: DetectionSource) -> Self {
        Self {
            triggered: false,
            source,
            events: Vec::new(),
            incident: None,
        }
    }
}

/// Requested change to an incident
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentUpdate {
    pub status: IncidentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

/// Outcome of an incident lookup or update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentResult {
    pub success: bool,
    pub message: String,
    pub incident: Option<Incident>,
}

impl IncidentResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            incident: None,
        }
    }
}

/// Incident counts for a tenant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentStats {
    pub total: usize,
    pub open: usize,
    pub by_status: HashMap<IncidentStatus, usize>,
    pub by_severity: HashMap<Severity, usize>,
    pub detection_events: usize,
}

/// Persisted incident store for one tenant
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IncidentDocument {
    pub incidents: Vec<Incident>,
    /// Append-only ledger of every detection event
    pub events: Vec<DetectionEvent>,
    pub version: u64,
}

impl Document for IncidentDocument {
    const COLLECTION: &'static str = "incidents";

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
