//! Incident severity classification
//!
//! Rules are checked in order and the first one that applies decides:
//!
//! | # | Condition                                               | Severity |
//! |---|---------------------------------------------------------|----------|
//! | 1 | three or more events                                    | critical |
//! | 2 | an `external` event with confidence >= 0.9              | critical |
//! | 3 | a leaked template in the `api_key`/`instruction` category| high     |
//! | 4 | two events, or any `tool_call` event                    | medium   |
//! | 5 | otherwise                                               | low      |

use super::types::{DetectionEvent, DetectionSource, Severity};
use crate::honeyfact::HoneyfactTemplate;

const CRITICAL_EVENT_COUNT: usize = 3;
const EXTERNAL_CRITICAL_CONFIDENCE: f64 = 0.9;

/// Classify the severity of a set of detection events.
///
/// `templates` is only used to look up the category of each leaked
/// honeyfact; events whose template is unknown contribute no category.
pub fn classify(events: &[DetectionEvent], templates: &[HoneyfactTemplate]) -> Severity {
    if events.len() >= CRITICAL_EVENT_COUNT {
        return Severity::Critical;
    }

    if events.iter().any(|e| {
        e.source == DetectionSource::External && e.confidence >= EXTERNAL_CRITICAL_CONFIDENCE
    }) {
        return Severity::Critical;
    }

    let high_risk_leak = events.iter().any(|e| {
        templates
            .iter()
            .find(|t| t.id == e.honeyfact_id)
            .is_some_and(|t| t.category.is_high_risk())
    });
    if high_risk_leak {
        return Severity::High;
    }

    if events.len() >= 2 || events.iter().any(|e| e.source == DetectionSource::ToolCall) {
        return Severity::Medium;
    }

    Severity::Low
}
