//! Integrity-aware retrieval
//!
//! Every read of memory or checkpoint data passes through a [`RetrievalMode`]
//! filter before use:
//!
//! | mode              | no metadata    | valid | suspect / unverified | invalid |
//! |-------------------|----------------|-------|----------------------|---------|
//! | `stable_only`     | kept (warning) | kept  | dropped              | dropped |
//! | `include_suspect` | kept (warning) | kept  | kept (warning)       | dropped |
//! | `execute_safe`    | dropped        | fresh | dropped              | dropped |
//!
//! Batch operations always evaluate every item.

use super::evidence::EvidenceBundle;
use super::types::*;
use super::validator::IntegrityValidator;
use crate::config::IntegrityConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An item that carries integrity metadata
pub trait IntegrityTracked {
    fn integrity(&self) -> Option<&IntegrityMetadata>;

    fn set_integrity(&mut self, metadata: IntegrityMetadata);

    /// The fields the validator evaluates
    fn integrity_data(&self) -> IntegrityData;
}

/// A stored agent memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityMetadata>,
}

impl MemoryRecord {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            created_at: Utc::now(),
            ttl_secs: None,
            source_revision: None,
            evidence: None,
            integrity: None,
        }
    }
}

impl IntegrityTracked for MemoryRecord {
    fn integrity(&self) -> Option<&IntegrityMetadata> {
        self.integrity.as_ref()
    }

    fn set_integrity(&mut self, metadata: IntegrityMetadata) {
        self.integrity = Some(metadata);
    }

    fn integrity_data(&self) -> IntegrityData {
        IntegrityData {
            created_at: Some(self.created_at),
            ttl_secs: self.ttl_secs,
            evidence_hash: self.evidence.as_ref().map(|b| b.hash.clone()),
            source_revision: self.source_revision.clone(),
            policy_version: None,
            evidence: self.evidence.clone(),
        }
    }
}

/// Pass/fail verdict plus the reasons behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub passed: bool,
    pub warnings: Vec<String>,
}

/// Options for a single retrieval
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Falls back to the configured default mode
    #[serde(default)]
    pub mode: Option<RetrievalMode>,
    /// Re-run validation before checking
    #[serde(default)]
    pub revalidate: bool,
}

/// An item together with its integrity verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityWrapped<T> {
    pub data: T,
    pub metadata: Option<IntegrityMetadata>,
    pub passed: bool,
    pub warnings: Vec<String>,
    pub evidence_hash: Option<String>,
}

/// Result of filtering a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome<T> {
    pub items: Vec<T>,
    pub excluded: usize,
    pub warnings: Vec<String>,
}

/// An item prepared for execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCandidate<T> {
    pub item: T,
    pub ready_for_execution: bool,
    pub warnings: Vec<String>,
}

/// Batch readiness summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReadiness {
    pub ready: bool,
    pub failed_indices: Vec<usize>,
    pub passed: usize,
    pub failed: usize,
    pub warnings: Vec<String>,
}

/// Applies retrieval modes, revalidating through the shared validator
pub struct IntegrityRetrieval {
    validator: Arc<IntegrityValidator>,
    default_mode: RetrievalMode,
    freshness: Duration,
}

impl IntegrityRetrieval {
    pub fn new(validator: Arc<IntegrityValidator>, config: &IntegrityConfig) -> Self {
        Self {
            validator,
            default_mode: config.default_mode,
            freshness: Duration::seconds(i64::try_from(config.freshness_secs).unwrap_or(i64::MAX)),
        }
    }

    pub fn default_mode(&self) -> RetrievalMode {
        self.default_mode
    }

    pub fn passes_integrity_check(
        &self,
        metadata: Option<&IntegrityMetadata>,
        mode: RetrievalMode,
    ) -> IntegrityCheck {
        self.passes_integrity_check_at(metadata, mode, Utc::now())
    }

    /// Check one item's metadata against `mode` as of `now`.
    pub fn passes_integrity_check_at(
        &self,
        metadata: Option<&IntegrityMetadata>,
        mode: RetrievalMode,
        now: DateTime<Utc>,
    ) -> IntegrityCheck {
        let Some(metadata) = metadata else {
            return IntegrityCheck {
                passed: mode != RetrievalMode::ExecuteSafe,
                warnings: vec!["no integrity metadata".to_string()],
            };
        };

        let mut warnings = Vec::new();
        let passed = match (metadata.status, mode) {
            (ValidityStatus::Invalid, _) => {
                warnings.push(match &metadata.invalid_reason {
                    Some(reason) => format!("invalid: {}", reason),
                    None => "invalid".to_string(),
                });
                false
            }
            (ValidityStatus::Valid, RetrievalMode::ExecuteSafe) => {
                match metadata.last_validated_at {
                    Some(at) if now.signed_duration_since(at) <= self.freshness => true,
                    Some(at) => {
                        warnings.push(format!("last validated at {}, outside freshness window", at));
                        false
                    }
                    None => {
                        warnings.push("never validated".to_string());
                        false
                    }
                }
            }
            (ValidityStatus::Valid, _) => true,
            (status, RetrievalMode::IncludeSuspect) => {
                warnings.push(format!("status is {}", status));
                true
            }
            (status, _) => {
                warnings.push(format!("status {} not allowed in {} mode", status, mode));
                false
            }
        };

        IntegrityCheck { passed, warnings }
    }

    /// Keep the items usable under `mode`.
    pub fn filter_by_mode<T: IntegrityTracked>(&self, items: Vec<T>, mode: RetrievalMode) -> Vec<T> {
        let now = Utc::now();
        items
            .into_iter()
            .filter(|item| self.passes_integrity_check_at(item.integrity(), mode, now).passed)
            .collect()
    }

    /// Filter a batch, optionally revalidating each item first.
    pub async fn filter_with_integrity<T: IntegrityTracked>(
        &self,
        items: Vec<T>,
        options: &RetrievalOptions,
    ) -> FilterOutcome<T> {
        let mode = options.mode.unwrap_or(self.default_mode);
        let mut outcome = FilterOutcome {
            items: Vec::new(),
            excluded: 0,
            warnings: Vec::new(),
        };

        for (index, mut item) in items.into_iter().enumerate() {
            if options.revalidate {
                self.refresh(&mut item).await;
            }
            let check = self.passes_integrity_check(item.integrity(), mode);
            outcome
                .warnings
                .extend(check.warnings.into_iter().map(|w| format!("item {}: {}", index, w)));
            if check.passed {
                outcome.items.push(item);
            } else {
                outcome.excluded += 1;
            }
        }

        if outcome.excluded > 0 {
            tracing::debug!(%mode, excluded = outcome.excluded, "Items excluded by integrity filter");
        }
        outcome
    }

    /// Attach the integrity verdict to a single item.
    pub async fn wrap_with_integrity<T: IntegrityTracked>(
        &self,
        mut item: T,
        options: &RetrievalOptions,
    ) -> IntegrityWrapped<T> {
        let mode = options.mode.unwrap_or(self.default_mode);
        if options.revalidate {
            self.refresh(&mut item).await;
        }
        let check = self.passes_integrity_check(item.integrity(), mode);
        let metadata = item.integrity().cloned();
        IntegrityWrapped {
            evidence_hash: metadata.as_ref().and_then(|m| m.evidence_hash.clone()),
            metadata,
            passed: check.passed,
            warnings: check.warnings,
            data: item,
        }
    }

    /// Revalidate every item and flag the ones safe to execute.
    pub async fn prepare_for_execution<T: IntegrityTracked>(
        &self,
        items: Vec<T>,
    ) -> Vec<ExecutionCandidate<T>> {
        let mut prepared = Vec::with_capacity(items.len());
        for mut item in items {
            self.refresh(&mut item).await;
            let check = self.passes_integrity_check(item.integrity(), RetrievalMode::ExecuteSafe);
            prepared.push(ExecutionCandidate {
                item,
                ready_for_execution: check.passed,
                warnings: check.warnings,
            });
        }
        prepared
    }

    /// Evaluate the whole batch under `execute_safe` without revalidating.
    pub fn check_execution_readiness<T: IntegrityTracked>(&self, items: &[T]) -> ExecutionReadiness {
        let now = Utc::now();
        let mut readiness = ExecutionReadiness {
            ready: true,
            failed_indices: Vec::new(),
            passed: 0,
            failed: 0,
            warnings: Vec::new(),
        };

        for (index, item) in items.iter().enumerate() {
            let check =
                self.passes_integrity_check_at(item.integrity(), RetrievalMode::ExecuteSafe, now);
            readiness
                .warnings
                .extend(check.warnings.into_iter().map(|w| format!("item {}: {}", index, w)));
            if check.passed {
                readiness.passed += 1;
            } else {
                readiness.failed += 1;
                readiness.failed_indices.push(index);
            }
        }

        readiness.ready = readiness.failed == 0;
        readiness
    }

    /// Revalidate an item that already carries metadata.
    async fn refresh<T: IntegrityTracked>(&self, item: &mut T) {
        let Some(metadata) = item.integrity().cloned() else {
            return;
        };
        let (updated, _) = self
            .validator
            .revalidate(&metadata, &item.integrity_data())
            .await;
        item.set_integrity(updated);
    }
}
