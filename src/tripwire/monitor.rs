//! Tripwire monitor
//!
//! Every `monitor_*` entry point funnels into [`TripwireMonitor::scan`]:
//!
//! ```text
//! content ──► source monitored? ──► exact pass ──► (no hits) fuzzy pass
//!                                        │                  │
//!                                        └──── events ◄─────┘
//!                                               │
//!                                  classify severity ─► persist incident
//! ```
//!
//! [`TripwireMonitor::dry_run`] runs the same detection and stops before
//! the persist step.
//!
//! The incident and its events are written in one repository mutation so the
//! event ledger never disagrees with the incident list.

use super::fuzzy::{self, FuzzyMatch};
use super::severity;
use super::types::*;
use crate::config::TripwireConfig;
use crate::error::Result;
use crate::honeyfact::{HoneyfactProvider, HoneyfactTemplate};
use crate::store::{Backend, Mutation, Repository};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Runtime switches that `set-config` may change
#[derive(Debug, Clone)]
struct MonitorSettings {
    enabled: bool,
    tripwire: TripwireConfig,
}

/// Scans content for leaked honeyfacts and records incidents
pub struct TripwireMonitor {
    provider: Arc<dyn HoneyfactProvider>,
    incidents: Repository<IncidentDocument>,
    settings: RwLock<MonitorSettings>,
}

impl TripwireMonitor {
    pub fn new(
        provider: Arc<dyn HoneyfactProvider>,
        backend: Arc<dyn Backend>,
        enabled: bool,
        config: TripwireConfig,
    ) -> Self {
        Self {
            provider,
            incidents: Repository::new(backend),
            settings: RwLock::new(MonitorSettings {
                enabled,
                tripwire: config,
            }),
        }
    }

    /// Current master switch and tripwire configuration
    pub async fn config(&self) -> (bool, TripwireConfig) {
        let settings = self.settings.read().await;
        (settings.enabled, settings.tripwire.clone())
    }

    /// Replace the master switch and tripwire configuration
    pub async fn configure(&self, enabled: bool, config: TripwireConfig) {
        let mut settings = self.settings.write().await;
        settings.enabled = enabled;
        settings.tripwire = config;
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    pub async fn monitor_output(
        &self,
        content: &str,
        tenant: &str,
        context: MatchContext,
    ) -> Result<TripwireResult> {
        self.scan(content, DetectionSource::Output, tenant, context)
            .await
    }

    /// Scan the arguments of a tool call.
    ///
    /// String values are scanned as written, followed by the serialized
    /// arguments, so escaping never hides a verbatim honeyfact.
    pub async fn monitor_tool_call(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        tenant: &str,
        mut context: MatchContext,
    ) -> Result<TripwireResult> {
        context.tool_name = Some(tool_name.to_string());
        context.tool_args = Some(args.clone());
        let content = tool_args_text(args);
        self.scan(&content, DetectionSource::ToolCall, tenant, context)
            .await
    }

    pub async fn monitor_tool_result(
        &self,
        tool_name: &str,
        content: &str,
        tenant: &str,
        mut context: MatchContext,
    ) -> Result<TripwireResult> {
        context.tool_name = Some(tool_name.to_string());
        self.scan(content, DetectionSource::ToolResult, tenant, context)
            .await
    }

    pub async fn monitor_memory_write(
        &self,
        memory_id: &str,
        content: &str,
        tenant: &str,
        mut context: MatchContext,
    ) -> Result<TripwireResult> {
        context.memory_id = Some(memory_id.to_string());
        self.scan(content, DetectionSource::MemoryWrite, tenant, context)
            .await
    }

    /// Scan traffic leaving the system, e.g. an outbound request body.
    pub async fn monitor_external(
        &self,
        content: &str,
        destination: &str,
        tenant: &str,
        mut context: MatchContext,
    ) -> Result<TripwireResult> {
        context.destination = Some(destination.to_string());
        self.scan(content, DetectionSource::External, tenant, context)
            .await
    }

    /// Scan `content` from `source`, persisting an incident if anything leaked.
    pub async fn scan(
        &self,
        content: &str,
        source: DetectionSource,
        tenant: &str,
        context: MatchContext,
    ) -> Result<TripwireResult> {
        let result = self.detect(content, source, tenant, context).await?;
        let Some(incident) = &result.incident else {
            return Ok(result);
        };

        let stored = incident.clone();
        let ledger = result.events.clone();
        self.incidents
            .mutate(tenant, move |doc| {
                doc.events.extend(ledger);
                doc.incidents.push(stored);
                Mutation::Commit(())
            })
            .await?;

        tracing::warn!(
            tenant,
            %source,
            incident_id = %incident.id,
            severity = %incident.severity,
            events = result.events.len(),
            "Honeyfact tripwire triggered"
        );
        Ok(result)
    }

    /// Scan like [`scan`](Self::scan) but record nothing.
    ///
    /// The returned incident is what `scan` would have stored; it is never
    /// written, so stats and the event ledger stay untouched.
    pub async fn dry_run(
        &self,
        content: &str,
        source: DetectionSource,
        tenant: &str,
        context: MatchContext,
    ) -> Result<TripwireResult> {
        let result = self.detect(content, source, tenant, context).await?;
        if result.triggered {
            tracing::info!(tenant, %source, events = result.events.len(), "Dry-run tripwire hit");
        }
        Ok(result)
    }

    async fn detect(
        &self,
        content: &str,
        source: DetectionSource,
        tenant: &str,
        context: MatchContext,
    ) -> Result<TripwireResult> {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            tracing::debug!(tenant, %source, "Tripwire disabled, skipping scan");
            return Ok(TripwireResult::untriggered(source));
        }
        if !settings.tripwire.monitored_sources.contains(&source) {
            tracing::debug!(tenant, %source, "Source not monitored, skipping scan");
            return Ok(TripwireResult::untriggered(source));
        }

        let original: Vec<char> = content.chars().collect();
        let lowered = lower_chars(content);
        let radius = settings.tripwire.snippet_radius;

        let exact = self.provider.find_exact_matches(content, tenant).await?;
        let mut events: Vec<DetectionEvent> = Vec::new();
        for template in &exact {
            if events.iter().any(|e| e.honeyfact_id == template.id) {
                continue;
            }
            let needle = lower_chars(&template.content);
            let span = find_chars(&lowered, &needle).map(|start| (start, start + needle.len()));
            events.push(build_event(
                template, source, 1.0, &original, span, radius, tenant, &context,
            ));
        }

        let kind = if !events.is_empty() {
            IncidentKind::HoneyfactLeak
        } else if settings.tripwire.fuzzy_enabled {
            let threshold = settings.tripwire.fuzzy_threshold;
            for template in self.provider.list_active(tenant).await? {
                let needle = lower_chars(&template.content);
                if let Some(FuzzyMatch {
                    start,
                    end,
                    similarity,
                    distance,
                }) = fuzzy::best_window(&lowered, &needle, threshold)
                {
                    tracing::debug!(
                        tenant,
                        honeyfact_id = %template.id,
                        distance,
                        similarity,
                        "Fuzzy honeyfact match"
                    );
                    events.push(build_event(
                        &template,
                        source,
                        similarity,
                        &original,
                        Some((start, end)),
                        radius,
                        tenant,
                        &context,
                    ));
                }
            }
            IncidentKind::FuzzyHoneyfactLeak
        } else {
            IncidentKind::HoneyfactLeak
        };

        if events.is_empty() {
            return Ok(TripwireResult::untriggered(source));
        }

        let templates = self.provider.list_all(tenant).await?;
        let severity = severity::classify(&events, &templates);
        let now = Utc::now();
        let incident = Incident {
            id: format!("inc-{}", uuid::Uuid::new_v4()),
            created_at: now,
            updated_at: now,
            severity,
            kind,
            events: events.clone(),
            status: IncidentStatus::Open,
            tenant: tenant.to_string(),
            resolution_notes: None,
            resolved_by: None,
        };

        Ok(TripwireResult {
            triggered: true,
            source,
            events,
            incident: Some(incident),
        })
    }

    // =========================================================================
    // Incident management
    // =========================================================================

    /// Incidents for a tenant, newest first, optionally filtered by status.
    pub async fn list_incidents(
        &self,
        tenant: &str,
        status: Option<IncidentStatus>,
    ) -> Result<Vec<Incident>> {
        let doc = self.incidents.load(tenant).await?;
        Ok(doc
            .incidents
            .into_iter()
            .rev()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .collect())
    }

    pub async fn get_incident(&self, tenant: &str, id: &str) -> Result<Option<Incident>> {
        let doc = self.incidents.load(tenant).await?;
        Ok(doc.incidents.into_iter().find(|i| i.id == id))
    }

    /// Move an incident along its lifecycle.
    pub async fn update_incident(
        &self,
        tenant: &str,
        id: &str,
        update: IncidentUpdate,
    ) -> Result<IncidentResult> {
        let result = self
            .incidents
            .mutate(tenant, |doc| {
                let Some(incident) = doc.incidents.iter_mut().find(|i| i.id == id) else {
                    return Mutation::Discard(IncidentResult::failure(format!(
                        "Incident {} not found",
                        id
                    )));
                };
                if !incident.status.can_transition_to(update.status) {
                    return Mutation::Discard(IncidentResult::failure(format!(
                        "Cannot move incident {} from {} to {}",
                        id, incident.status, update.status
                    )));
                }

                incident.status = update.status;
                incident.updated_at = Utc::now();
                if update.notes.is_some() {
                    incident.resolution_notes = update.notes;
                }
                if update.resolved_by.is_some() {
                    incident.resolved_by = update.resolved_by;
                }
                Mutation::Commit(IncidentResult {
                    success: true,
                    message: format!("Incident {} is now {}", id, incident.status),
                    incident: Some(incident.clone()),
                })
            })
            .await?;

        if result.success {
            tracing::info!(tenant, incident_id = id, "Incident updated");
        } else {
            tracing::warn!(tenant, incident_id = id, message = %result.message, "Incident update rejected");
        }
        Ok(result)
    }

    /// The tenant's detection event ledger, oldest first.
    pub async fn list_detection_events(&self, tenant: &str) -> Result<Vec<DetectionEvent>> {
        Ok(self.incidents.load(tenant).await?.events)
    }

    pub async fn incident_stats(&self, tenant: &str) -> Result<IncidentStats> {
        let doc = self.incidents.load(tenant).await?;
        let mut by_status: HashMap<IncidentStatus, usize> = HashMap::new();
        let mut by_severity: HashMap<Severity, usize> = HashMap::new();
        for incident in &doc.incidents {
            *by_status.entry(incident.status).or_default() += 1;
            *by_severity.entry(incident.severity).or_default() += 1;
        }
        Ok(IncidentStats {
            total: doc.incidents.len(),
            open: doc
                .incidents
                .iter()
                .filter(|i| !i.status.is_terminal())
                .count(),
            by_status,
            by_severity,
            detection_events: doc.events.len(),
        })
    }
}

/// String leaves of tool arguments, one per line, then the serialized form.
fn tool_args_text(args: &serde_json::Value) -> String {
    fn collect<'a>(value: &'a serde_json::Value, out: &mut Vec<&'a str>) {
        match value {
            serde_json::Value::String(s) => out.push(s),
            serde_json::Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            serde_json::Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            _ => {}
        }
    }

    let mut leaves = Vec::new();
    collect(args, &mut leaves);
    leaves.push("");
    let mut text = leaves.join("\n");
    text.push_str(&args.to_string());
    text
}

/// Lower-case character by character so offsets line up with the original.
fn lower_chars(s: &str) -> Vec<char> {
    s.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[allow(clippy::too_many_arguments)]
fn build_event(
    template: &HoneyfactTemplate,
    source: DetectionSource,
    confidence: f64,
    content: &[char],
    span: Option<(usize, usize)>,
    radius: usize,
    tenant: &str,
    context: &MatchContext,
) -> DetectionEvent {
    let (matched_text, snippet) = match span {
        Some((start, end)) => {
            let from = start.saturating_sub(radius);
            let to = (end + radius).min(content.len());
            (
                content[start..end].iter().collect(),
                content[from..to].iter().collect(),
            )
        }
        // Case folding changed the length; keep the template and the head.
        None => (
            template.content.clone(),
            content.iter().take(radius * 2).collect(),
        ),
    };

    DetectionEvent {
        id: format!("det-{}", uuid::Uuid::new_v4()),
        timestamp: Utc::now(),
        honeyfact_id: template.id.clone(),
        source,
        confidence,
        matched_text,
        snippet,
        context: context.clone(),
        tenant: tenant.to_string(),
    }
}
