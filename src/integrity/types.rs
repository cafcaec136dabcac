//! Integrity policy types: validity metadata, rules and validation results

use super::evidence::EvidenceBundle;
use crate::config::IntegrityConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy-derived trust label of a data item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityStatus {
    Valid,
    Suspect,
    Invalid,
    Unverified,
}

impl std::fmt::Display for ValidityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Suspect => write!(f, "suspect"),
            Self::Invalid => write!(f, "invalid"),
            Self::Unverified => write!(f, "unverified"),
        }
    }
}

impl std::str::FromStr for ValidityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(Self::Valid),
            "suspect" => Ok(Self::Suspect),
            "invalid" => Ok(Self::Invalid),
            "unverified" => Ok(Self::Unverified),
            other => Err(format!("unknown validity status: {}", other)),
        }
    }
}

/// Which validity statuses a reader is willing to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Only valid items (or items with no metadata)
    StableOnly,
    /// Everything except invalid items
    #[default]
    IncludeSuspect,
    /// Valid and recently validated items only
    ExecuteSafe,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StableOnly => write!(f, "stable_only"),
            Self::IncludeSuspect => write!(f, "include_suspect"),
            Self::ExecuteSafe => write!(f, "execute_safe"),
        }
    }
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable_only" => Ok(Self::StableOnly),
            "include_suspect" => Ok(Self::IncludeSuspect),
            "execute_safe" => Ok(Self::ExecuteSafe),
            other => Err(format!("unknown retrieval mode: {}", other)),
        }
    }
}

/// Validity metadata attached to a memory or checkpoint.
///
/// Keyed by the owning entity's id; the owner does not hold a reference back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityMetadata {
    pub status: ValidityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidated_at: Option<DateTime<Utc>>,
}

impl IntegrityMetadata {
    /// Metadata for an item nobody has checked yet
    pub fn unverified() -> Self {
        Self {
            status: ValidityStatus::Unverified,
            ttl_secs: None,
            source_revision: None,
            evidence_hash: None,
            policy_version: None,
            last_validated_at: None,
            invalid_reason: None,
            invalidated_at: None,
        }
    }
}

/// Severity of a failed rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Error,
    Warning,
}

/// What a rule checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Item must be younger than its own TTL, or `max_age_secs`
    TtlCheck { max_age_secs: u64 },
    /// Item must carry an evidence-bundle hash
    EvidenceRequired,
    /// Item must name its source revision when `require_hash` is set
    SourceCheck { require_hash: bool },
    /// Item must have been stamped by at least `min_version`
    PolicyVersionCheck { min_version: String },
    /// Reserved for integrator-defined checks; always passes
    Custom { name: String },
}

impl RuleCondition {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TtlCheck { .. } => "ttl_check",
            Self::EvidenceRequired => "evidence_required",
            Self::SourceCheck { .. } => "source_check",
            Self::PolicyVersionCheck { .. } => "policy_version_check",
            Self::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityRule {
    pub id: String,
    pub severity: RuleSeverity,
    pub condition: RuleCondition,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl IntegrityRule {
    pub fn new(id: impl Into<String>, severity: RuleSeverity, condition: RuleCondition) -> Self {
        Self {
            id: id.into(),
            severity,
            condition,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Versioned rule set. Replaced as a whole, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityPolicy {
    pub version: String,
    pub name: String,
    pub rules: Vec<IntegrityRule>,
    #[serde(default)]
    pub default_mode: RetrievalMode,
    #[serde(default)]
    pub strict_mode: bool,
}

/// Version stamped by the built-in policy
pub const DEFAULT_POLICY_VERSION: &str = "1.0.0";

impl IntegrityPolicy {
    /// Built-in policy, parameterised by the integrity configuration
    pub fn from_config(config: &IntegrityConfig) -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            name: "default".to_string(),
            rules: vec![
                IntegrityRule::new(
                    "ttl",
                    RuleSeverity::Error,
                    RuleCondition::TtlCheck {
                        max_age_secs: config.default_ttl_secs,
                    },
                ),
                IntegrityRule::new(
                    "evidence",
                    RuleSeverity::Warning,
                    RuleCondition::EvidenceRequired,
                )
                .disabled(),
                IntegrityRule::new(
                    "source",
                    RuleSeverity::Warning,
                    RuleCondition::SourceCheck {
                        require_hash: false,
                    },
                ),
                IntegrityRule::new(
                    "policy_version",
                    RuleSeverity::Warning,
                    RuleCondition::PolicyVersionCheck {
                        min_version: DEFAULT_POLICY_VERSION.to_string(),
                    },
                ),
            ],
            default_mode: config.default_mode,
            strict_mode: config.strict_mode,
        }
    }
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self::from_config(&IntegrityConfig::default())
    }
}

/// The fields of a data item the rules look at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityData {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub evidence_hash: Option<String>,
    #[serde(default)]
    pub source_revision: Option<String>,
    #[serde(default)]
    pub policy_version: Option<String>,
    /// Full bundle, when available, so its hash can be re-checked
    #[serde(default)]
    pub evidence: Option<EvidenceBundle>,
}

impl IntegrityData {
    pub fn created_at(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(created_at),
            ..Default::default()
        }
    }

    /// Fill missing fields from previously stamped metadata.
    pub fn with_fallback(mut self, metadata: &IntegrityMetadata) -> Self {
        if self.ttl_secs.is_none() {
            self.ttl_secs = metadata.ttl_secs;
        }
        if self.evidence_hash.is_none() {
            self.evidence_hash = metadata.evidence_hash.clone();
        }
        if self.source_revision.is_none() {
            self.source_revision = metadata.source_revision.clone();
        }
        if self.policy_version.is_none() {
            self.policy_version = metadata.policy_version.clone();
        }
        self
    }
}

/// Outcome of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub severity: RuleSeverity,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of validating one item against the active policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub status: ValidityStatus,
    /// Failed error-severity rules
    pub errors: Vec<String>,
    /// Failed warning-severity rules
    pub warnings: Vec<String>,
    pub rules: Vec<RuleOutcome>,
    pub policy_version: String,
}
