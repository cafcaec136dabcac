//! Integrity validator
//!
//! Evaluates data against the active [`IntegrityPolicy`]. Enabled rules run
//! in order; a failed rule never stops the others.
//!
//! | Failures                    | strict | status  | valid |
//! |-----------------------------|--------|---------|-------|
//! | none                        | any    | valid   | true  |
//! | warnings only               | any    | suspect | true  |
//! | at least one error          | no     | suspect | true  |
//! | at least one error          | yes    | invalid | false |

use super::types::*;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Rule id reported when an attached evidence bundle fails its hash check
pub const EVIDENCE_INTEGRITY_RULE: &str = "evidence_integrity";

/// Holds the active policy and evaluates data against it
pub struct IntegrityValidator {
    policy: RwLock<IntegrityPolicy>,
}

impl IntegrityValidator {
    pub fn new(policy: IntegrityPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    /// Snapshot of the active policy
    pub async fn policy(&self) -> IntegrityPolicy {
        self.policy.read().await.clone()
    }

    /// Replace the active policy.
    pub async fn set_policy(&self, policy: IntegrityPolicy) -> Result<()> {
        if policy.version.trim().is_empty() {
            return Err(Error::InvalidInput("policy version must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for rule in &policy.rules {
            if rule.id.trim().is_empty() {
                return Err(Error::InvalidInput("rule id must not be empty".to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(Error::InvalidInput(format!("duplicate rule id: {}", rule.id)));
            }
        }

        tracing::info!(
            version = %policy.version,
            name = %policy.name,
            rules = policy.rules.len(),
            strict = policy.strict_mode,
            "Integrity policy replaced"
        );
        *self.policy.write().await = policy;
        Ok(())
    }

    pub async fn validate(&self, data: &IntegrityData) -> ValidationResult {
        self.validate_at(data, Utc::now()).await
    }

    /// Validate as of `now`.
    pub async fn validate_at(&self, data: &IntegrityData, now: DateTime<Utc>) -> ValidationResult {
        let policy = self.policy.read().await;
        evaluate(&policy, data, now)
    }

    /// Stamp a freshly written item as valid under the active policy.
    pub async fn create_integrity_metadata(&self, data: &IntegrityData) -> IntegrityMetadata {
        let policy = self.policy.read().await;
        IntegrityMetadata {
            status: ValidityStatus::Valid,
            ttl_secs: data.ttl_secs,
            source_revision: data.source_revision.clone(),
            evidence_hash: data
                .evidence_hash
                .clone()
                .or_else(|| data.evidence.as_ref().map(|b| b.hash.clone())),
            policy_version: Some(policy.version.clone()),
            last_validated_at: Some(Utc::now()),
            invalid_reason: None,
            invalidated_at: None,
        }
    }

    pub fn mark_invalid(&self, metadata: &mut IntegrityMetadata, reason: impl Into<String>) {
        let now = Utc::now();
        metadata.status = ValidityStatus::Invalid;
        metadata.invalid_reason = Some(reason.into());
        metadata.invalidated_at = Some(now);
        metadata.last_validated_at = Some(now);
    }

    pub fn mark_suspect(&self, metadata: &mut IntegrityMetadata, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!(reason = %reason, "Marking item suspect");
        metadata.status = ValidityStatus::Suspect;
        metadata.last_validated_at = Some(Utc::now());
    }

    /// Re-run validation and fold the outcome into `metadata`.
    ///
    /// Fields missing from `data` are taken from `metadata`. The validated-at
    /// timestamp always moves forward and the policy version never moves back.
    pub async fn revalidate(
        &self,
        metadata: &IntegrityMetadata,
        data: &IntegrityData,
    ) -> (IntegrityMetadata, ValidationResult) {
        let now = Utc::now();
        let effective = data.clone().with_fallback(metadata);
        let result = self.validate_at(&effective, now).await;

        let mut updated = metadata.clone();
        updated.status = result.status;
        updated.ttl_secs = effective.ttl_secs;
        updated.source_revision = effective.source_revision.clone();
        updated.evidence_hash = effective
            .evidence_hash
            .clone()
            .or_else(|| effective.evidence.as_ref().map(|b| b.hash.clone()));
        updated.policy_version = Some(match metadata.policy_version.as_deref() {
            Some(previous) if compare_versions(previous, &result.policy_version).is_gt() => {
                previous.to_string()
            }
            _ => result.policy_version.clone(),
        });
        updated.last_validated_at = Some(match metadata.last_validated_at {
            Some(previous) if previous >= now => previous + Duration::milliseconds(1),
            _ => now,
        });
        if result.status == ValidityStatus::Invalid {
            updated.invalid_reason = Some(result.errors.join("; "));
            updated.invalidated_at = Some(now);
        } else {
            updated.invalid_reason = None;
            updated.invalidated_at = None;
        }

        (updated, result)
    }
}

impl Default for IntegrityValidator {
    fn default() -> Self {
        Self::new(IntegrityPolicy::default())
    }
}

fn evaluate(policy: &IntegrityPolicy, data: &IntegrityData, now: DateTime<Utc>) -> ValidationResult {
    let mut outcomes: Vec<RuleOutcome> = policy
        .rules
        .iter()
        .filter(|rule| rule.enabled)
        .map(|rule| {
            let failure = check_rule(&rule.condition, data, now);
            RuleOutcome {
                rule_id: rule.id.clone(),
                severity: rule.severity,
                passed: failure.is_none(),
                message: failure,
            }
        })
        .collect();

    if let Some(bundle) = &data.evidence {
        let intact = bundle.verify();
        outcomes.push(RuleOutcome {
            rule_id: EVIDENCE_INTEGRITY_RULE.to_string(),
            severity: RuleSeverity::Error,
            passed: intact,
            message: (!intact).then(|| format!("evidence bundle {} hash mismatch", bundle.id)),
        });
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for outcome in outcomes.iter().filter(|o| !o.passed) {
        let message = format!(
            "{}: {}",
            outcome.rule_id,
            outcome.message.as_deref().unwrap_or("failed")
        );
        match outcome.severity {
            RuleSeverity::Error => errors.push(message),
            RuleSeverity::Warning => warnings.push(message),
        }
    }

    let (status, valid) = if !errors.is_empty() && policy.strict_mode {
        (ValidityStatus::Invalid, false)
    } else if !errors.is_empty() || !warnings.is_empty() {
        (ValidityStatus::Suspect, true)
    } else {
        (ValidityStatus::Valid, true)
    };

    ValidationResult {
        valid,
        status,
        errors,
        warnings,
        rules: outcomes,
        policy_version: policy.version.clone(),
    }
}

/// `None` when the condition holds, otherwise the failure message.
fn check_rule(condition: &RuleCondition, data: &IntegrityData, now: DateTime<Utc>) -> Option<String> {
    match condition {
        RuleCondition::TtlCheck { max_age_secs } => {
            let created_at = data.created_at?;
            let ttl = data.ttl_secs.unwrap_or(*max_age_secs);
            let age = now.signed_duration_since(created_at).num_seconds();
            let limit = i64::try_from(ttl).unwrap_or(i64::MAX);
            (age > limit).then(|| format!("age {}s exceeds ttl {}s", age, ttl))
        }
        RuleCondition::EvidenceRequired => {
            let has_hash = data.evidence_hash.is_some() || data.evidence.is_some();
            (!has_hash).then(|| "no evidence bundle hash".to_string())
        }
        RuleCondition::SourceCheck { require_hash } => (*require_hash
            && data.source_revision.is_none())
        .then(|| "no source revision".to_string()),
        RuleCondition::PolicyVersionCheck { min_version } => match &data.policy_version {
            None => Some("no policy version".to_string()),
            Some(version) if compare_versions(version, min_version).is_lt() => Some(format!(
                "policy version {} is older than {}",
                version, min_version
            )),
            Some(_) => None,
        },
        RuleCondition::Custom { .. } => None,
    }
}

/// Compare `major.minor.patch` versions numerically; missing parts count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    parse_version(a).cmp(&parse_version(b))
}

fn parse_version(version: &str) -> [u64; 3] {
    let mut parts = [0u64; 3];
    for (slot, piece) in parts.iter_mut().zip(version.trim().split('.')) {
        let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::evidence::{EvidenceBundle, EvidenceItem};

    fn forty_days_old() -> IntegrityData {
        IntegrityData::created_at(Utc::now() - Duration::days(40))
    }

    fn strict_policy() -> IntegrityPolicy {
        IntegrityPolicy {
            strict_mode: true,
            ..IntegrityPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_expired_item_is_suspect_when_lenient() {
        let validator = IntegrityValidator::default();
        let result = validator.validate(&forty_days_old()).await;
        assert!(result.valid);
        assert_eq!(result.status, ValidityStatus::Suspect);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("ttl:"));
    }

    #[tokio::test]
    async fn test_expired_item_is_invalid_when_strict() {
        let validator = IntegrityValidator::new(strict_policy());
        let result = validator.validate(&forty_days_old()).await;
        assert!(!result.valid);
        assert_eq!(result.status, ValidityStatus::Invalid);
    }

    #[tokio::test]
    async fn test_fresh_stamped_item_is_valid() {
        let validator = IntegrityValidator::new(strict_policy());
        let data = IntegrityData {
            policy_version: Some("1.0.0".to_string()),
            ..IntegrityData::created_at(Utc::now() - Duration::days(1))
        };
        let result = validator.validate(&data).await;
        assert_eq!(result.status, ValidityStatus::Valid);
        assert!(result.errors.is_empty() && result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_item_ttl_overrides_rule() {
        let validator = IntegrityValidator::default();
        let data = IntegrityData {
            ttl_secs: Some(60),
            policy_version: Some("1.0.0".to_string()),
            ..IntegrityData::created_at(Utc::now() - Duration::minutes(5))
        };
        let result = validator.validate(&data).await;
        assert_eq!(result.errors.len(), 1);

        let data = IntegrityData {
            ttl_secs: Some(90 * 24 * 3600),
            ..forty_days_old()
        };
        let result = validator.validate(&data).await;
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let validator = IntegrityValidator::default();
        let data = IntegrityData {
            ttl_secs: Some(u64::MAX),
            policy_version: Some("1.0.0".to_string()),
            ..forty_days_old()
        };
        let result = validator.validate(&data).await;
        assert!(result.errors.is_empty());
        assert_eq!(result.status, ValidityStatus::Valid);
    }

    #[tokio::test]
    async fn test_missing_policy_version_is_warning() {
        let validator = IntegrityValidator::default();
        let result = validator.validate(&IntegrityData::created_at(Utc::now())).await;
        assert!(result.valid);
        assert_eq!(result.status, ValidityStatus::Suspect);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("no policy version"));
    }

    #[tokio::test]
    async fn test_rule_kinds() {
        let policy = IntegrityPolicy {
            version: "2.0.0".to_string(),
            name: "paranoid".to_string(),
            rules: vec![
                IntegrityRule::new("evidence", RuleSeverity::Error, RuleCondition::EvidenceRequired),
                IntegrityRule::new(
                    "source",
                    RuleSeverity::Warning,
                    RuleCondition::SourceCheck { require_hash: true },
                ),
                IntegrityRule::new(
                    "version",
                    RuleSeverity::Warning,
                    RuleCondition::PolicyVersionCheck {
                        min_version: "2.1".to_string(),
                    },
                ),
                IntegrityRule::new(
                    "custom",
                    RuleSeverity::Error,
                    RuleCondition::Custom {
                        name: "reserved".to_string(),
                    },
                ),
            ],
            default_mode: RetrievalMode::StableOnly,
            strict_mode: true,
        };
        let validator = IntegrityValidator::new(policy);

        let bare = IntegrityData {
            policy_version: Some("2.0.9".to_string()),
            ..Default::default()
        };
        let result = validator.validate(&bare).await;
        assert_eq!(result.status, ValidityStatus::Invalid);
        assert_eq!(result.errors, vec!["evidence: no evidence bundle hash"]);
        assert_eq!(result.warnings.len(), 2);
        assert!(result.rules.iter().find(|r| r.rule_id == "custom").unwrap().passed);

        let complete = IntegrityData {
            evidence_hash: Some("ab".repeat(32)),
            source_revision: Some("git:1a2b3c".to_string()),
            policy_version: Some("2.1.0".to_string()),
            ..Default::default()
        };
        let result = validator.validate(&complete).await;
        assert_eq!(result.status, ValidityStatus::Valid);
    }

    #[tokio::test]
    async fn test_disabled_rules_are_skipped() {
        let validator = IntegrityValidator::default();
        let result = validator.validate(&IntegrityData::default()).await;
        assert!(result.rules.iter().all(|r| r.rule_id != "evidence"));
    }

    #[tokio::test]
    async fn test_tampered_evidence_is_error() {
        let validator = IntegrityValidator::new(strict_policy());
        let mut bundle = EvidenceBundle::new(vec![EvidenceItem::from_content(
            "document",
            "kb/a.md",
            b"alpha",
        )])
        .unwrap();
        bundle.items[0].content_hash = "0".repeat(64);

        let data = IntegrityData {
            policy_version: Some("1.0.0".to_string()),
            evidence: Some(bundle),
            ..IntegrityData::created_at(Utc::now())
        };
        let result = validator.validate(&data).await;
        assert_eq!(result.status, ValidityStatus::Invalid);
        assert!(result.errors[0].starts_with(EVIDENCE_INTEGRITY_RULE));
    }

    #[test]
    fn test_validate_is_idempotent() {
        let validator = IntegrityValidator::default();
        let data = forty_days_old();
        let now = Utc::now();
        let first = tokio_test::block_on(validator.validate_at(&data, now));
        let second = tokio_test::block_on(validator.validate_at(&data, now));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_create_metadata_is_valid() {
        let validator = IntegrityValidator::default();
        let data = IntegrityData {
            source_revision: Some("rev-9".to_string()),
            ..IntegrityData::created_at(Utc::now())
        };
        let metadata = validator.create_integrity_metadata(&data).await;
        assert_eq!(metadata.status, ValidityStatus::Valid);
        assert_eq!(metadata.policy_version.as_deref(), Some("1.0.0"));
        assert_eq!(metadata.source_revision.as_deref(), Some("rev-9"));
        assert!(metadata.last_validated_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_invalid_and_suspect() {
        let validator = IntegrityValidator::default();
        let mut metadata = IntegrityMetadata::unverified();
        validator.mark_suspect(&mut metadata, "odd provenance");
        assert_eq!(metadata.status, ValidityStatus::Suspect);

        validator.mark_invalid(&mut metadata, "honeyfact leak");
        assert_eq!(metadata.status, ValidityStatus::Invalid);
        assert_eq!(metadata.invalid_reason.as_deref(), Some("honeyfact leak"));
        assert!(metadata.invalidated_at.is_some());
    }

    #[tokio::test]
    async fn test_revalidate_advances_timestamp_and_keeps_version() {
        let validator = IntegrityValidator::default();
        let future = Utc::now() + Duration::hours(1);
        let metadata = IntegrityMetadata {
            status: ValidityStatus::Valid,
            policy_version: Some("3.0.0".to_string()),
            last_validated_at: Some(future),
            ..IntegrityMetadata::unverified()
        };

        let (updated, result) = validator
            .revalidate(&metadata, &IntegrityData::created_at(Utc::now()))
            .await;
        assert_eq!(result.status, ValidityStatus::Valid);
        assert!(updated.last_validated_at.unwrap() > future);
        assert_eq!(updated.policy_version.as_deref(), Some("3.0.0"));

        let older = IntegrityMetadata {
            policy_version: Some("0.9.0".to_string()),
            ..IntegrityMetadata::unverified()
        };
        let (updated, result) = validator
            .revalidate(&older, &IntegrityData::created_at(Utc::now()))
            .await;
        // The old stamp fails the version rule, then the stamp is raised.
        assert_eq!(result.status, ValidityStatus::Suspect);
        assert_eq!(updated.policy_version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_revalidate_records_invalid_reason() {
        let validator = IntegrityValidator::new(strict_policy());
        let metadata = IntegrityMetadata {
            status: ValidityStatus::Valid,
            policy_version: Some("1.0.0".to_string()),
            ..IntegrityMetadata::unverified()
        };
        let (updated, _) = validator.revalidate(&metadata, &forty_days_old()).await;
        assert_eq!(updated.status, ValidityStatus::Invalid);
        assert!(updated.invalid_reason.unwrap().contains("exceeds ttl"));
    }

    #[tokio::test]
    async fn test_set_policy_rejects_bad_rule_ids() {
        let validator = IntegrityValidator::default();
        let mut policy = IntegrityPolicy::default();
        policy.rules[1].id = "ttl".to_string();
        assert!(validator.set_policy(policy).await.is_err());

        let mut policy = IntegrityPolicy::default();
        policy.rules[0].id = " ".to_string();
        assert!(validator.set_policy(policy).await.is_err());

        let policy = IntegrityPolicy {
            version: "1.1.0".to_string(),
            strict_mode: true,
            ..IntegrityPolicy::default()
        };
        validator.set_policy(policy).await.unwrap();
        assert_eq!(validator.policy().await.version, "1.1.0");
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("2", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0-beta", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("", "0.0.0"), Ordering::Equal);
    }
}
