//! Memory integrity policy
//!
//! [`IntegrityValidator`] holds the active rule set and labels data as
//! valid, suspect or invalid. [`IntegrityRetrieval`] gates reads on those
//! labels so that only data trusted enough for the caller's purpose is used.

pub mod evidence;
pub mod retrieval;
pub mod types;
pub mod validator;

pub use evidence::{EvidenceBundle, EvidenceItem};
pub use retrieval::{
    ExecutionCandidate, ExecutionReadiness, FilterOutcome, IntegrityCheck, IntegrityRetrieval,
    IntegrityTracked, IntegrityWrapped, MemoryRecord, RetrievalOptions,
};
pub use types::{
    IntegrityData, IntegrityMetadata, IntegrityPolicy, IntegrityRule, RetrievalMode, RuleCondition,
    RuleOutcome, RuleSeverity, ValidationResult, ValidityStatus,
};
pub use validator::IntegrityValidator;
