//! Memory Integrity Grid facade
//!
//! Wires the honeyfact provider, tripwire monitor, integrity validator,
//! retrieval gate and containment controller over one storage backend, and
//! exposes the operator command surface (status, seed, rotate, incidents,
//! quarantine, release, config, test input, clear).
//!
//! ```text
//!            scan ──► TripwireMonitor ──incident──► ContainmentController
//!                            │                              │
//!                   HoneyfactProvider                 audit trail
//!
//!   ingest_memory ──► IntegrityValidator ──► IntegrityRetrieval ◄── retrieve_memories
//! ```

use crate::config::{GridConfig, TripwireConfig};
use crate::containment::{
    ContainmentController, ContainmentPolicy, ContainmentResult, ContainmentStatus,
    QuarantineRequest, TargetType,
};
use crate::error::Result;
use crate::honeyfact::{HoneyfactProvider, HoneyfactTemplate, RotationSummary, StoreHoneyfactProvider};
use crate::integrity::{
    FilterOutcome, IntegrityPolicy, IntegrityRetrieval, IntegrityTracked, IntegrityValidator,
    MemoryRecord, RetrievalOptions,
};
use crate::store::{self, Backend};
use crate::tripwire::{
    DetectionSource, Incident, IncidentResult, IncidentStats, IncidentStatus, IncidentUpdate,
    MatchContext, Severity, TripwireMonitor, TripwireResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tenant used when a caller does not name one
pub const DEFAULT_TENANT: &str = "default";

/// Keys accepted by [`MemoryIntegrityGrid::set_config`]
pub const CONFIG_KEYS: [&str; 7] = [
    "enabled",
    "tripwire.fuzzy_enabled",
    "tripwire.fuzzy_threshold",
    "containment.policy",
    "containment.auto_escalate_critical",
    "containment.auto_quarantine_threshold",
    "integrity.strict_mode",
];

/// Tripwire scan followed by containment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub tripwire: TripwireResult,
    pub containment: Vec<ContainmentResult>,
}

/// Memory write after scanning and stamping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryIngest {
    pub record: MemoryRecord,
    pub scan: ScanOutcome,
}

/// Result of `status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridStatus {
    pub tenant: String,
    pub enabled: bool,
    pub fuzzy_enabled: bool,
    pub fuzzy_threshold: f64,
    pub policy_version: String,
    pub strict_mode: bool,
    pub honeyfacts_active: usize,
    pub honeyfacts_total: usize,
    pub incidents: IncidentStats,
    pub containment: ContainmentStatus,
}

/// Result of `seed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResult {
    pub success: bool,
    pub message: String,
    pub seeded: Vec<HoneyfactTemplate>,
}

/// Result of `clear-honeyfacts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResult {
    pub success: bool,
    pub message: String,
    pub removed: usize,
}

/// Result of `set-config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigChange {
    pub success: bool,
    pub message: String,
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<GridConfig>,
}

impl ConfigChange {
    fn failure(key: &str, value: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            key: key.to_string(),
            value: value.to_string(),
            config: None,
        }
    }
}

/// The assembled grid
pub struct MemoryIntegrityGrid {
    config: RwLock<GridConfig>,
    honeyfacts: Arc<StoreHoneyfactProvider>,
    monitor: TripwireMonitor,
    validator: Arc<IntegrityValidator>,
    retrieval: IntegrityRetrieval,
    containment: ContainmentController,
}

impl MemoryIntegrityGrid {
    /// Build a grid on the backend named by the storage configuration.
    pub fn new(config: GridConfig) -> Result<Self> {
        let backend = store::open_backend(&config.storage);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: GridConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate()?;

        let honeyfacts = Arc::new(StoreHoneyfactProvider::new(
            backend.clone(),
            config.honeyfacts.ttl_days,
        ));
        let monitor = TripwireMonitor::new(
            honeyfacts.clone(),
            backend.clone(),
            config.enabled,
            config.tripwire.clone(),
        );
        let validator = Arc::new(IntegrityValidator::new(IntegrityPolicy::from_config(
            &config.integrity,
        )));
        let retrieval = IntegrityRetrieval::new(validator.clone(), &config.integrity);
        let containment = ContainmentController::new(backend, config.containment.clone());

        tracing::debug!(
            policy = %config.containment.policy,
            fuzzy = config.tripwire.fuzzy_enabled,
            "Memory integrity grid assembled"
        );

        Ok(Self {
            config: RwLock::new(config),
            honeyfacts,
            monitor,
            validator,
            retrieval,
            containment,
        })
    }

    pub fn monitor(&self) -> &TripwireMonitor {
        &self.monitor
    }

    pub fn validator(&self) -> &IntegrityValidator {
        &self.validator
    }

    pub fn retrieval(&self) -> &IntegrityRetrieval {
        &self.retrieval
    }

    pub fn containment(&self) -> &ContainmentController {
        &self.containment
    }

    pub fn honeyfacts(&self) -> &StoreHoneyfactProvider {
        &self.honeyfacts
    }

    // =========================================================================
    // Detection and containment flow
    // =========================================================================

    /// Run the tripwire and hand any incident to the containment controller.
    ///
    /// When containment actually quarantined something, the incident moves to
    /// `contained`.
    pub async fn scan(
        &self,
        content: &str,
        source: DetectionSource,
        tenant: &str,
        context: MatchContext,
    ) -> Result<ScanOutcome> {
        let mut tripwire = self.monitor.scan(content, source, tenant, context).await?;
        let Some(incident) = tripwire.incident.clone() else {
            return Ok(ScanOutcome {
                tripwire,
                containment: Vec::new(),
            });
        };

        let containment = self.containment.handle_incident(&incident).await?;
        if containment.iter().any(|r| r.record.is_some()) {
            let update = IncidentUpdate {
                status: IncidentStatus::Contained,
                notes: None,
                resolved_by: None,
            };
            let updated = self.monitor.update_incident(tenant, &incident.id, update).await?;
            if let Some(contained) = updated.incident {
                tripwire.incident = Some(contained);
            }
        }

        Ok(ScanOutcome {
            tripwire,
            containment,
        })
    }

    /// Scan a memory write, then stamp the record with integrity metadata.
    /// A record that leaked a honeyfact is stamped invalid.
    pub async fn ingest_memory(
        &self,
        tenant: &str,
        mut record: MemoryRecord,
        mut context: MatchContext,
    ) -> Result<MemoryIngest> {
        context.memory_id = Some(record.id.clone());
        let scan = self
            .scan(&record.content, DetectionSource::MemoryWrite, tenant, context)
            .await?;

        let mut metadata = self
            .validator
            .create_integrity_metadata(&record.integrity_data())
            .await;
        if let Some(incident) = &scan.tripwire.incident {
            self.validator.mark_invalid(
                &mut metadata,
                format!("honeyfact leak detected in incident {}", incident.id),
            );
        }
        record.set_integrity(metadata);

        Ok(MemoryIngest { record, scan })
    }

    /// Integrity-filter memories and drop the ones in active quarantine.
    pub async fn retrieve_memories(
        &self,
        tenant: &str,
        records: Vec<MemoryRecord>,
        options: &RetrievalOptions,
    ) -> Result<FilterOutcome<MemoryRecord>> {
        let mut outcome = self.retrieval.filter_with_integrity(records, options).await;
        let mut kept = Vec::with_capacity(outcome.items.len());
        for record in outcome.items {
            if self.containment.is_memory_quarantined(tenant, &record.id).await? {
                outcome.excluded += 1;
                outcome
                    .warnings
                    .push(format!("memory {} is quarantined", record.id));
            } else {
                kept.push(record);
            }
        }
        outcome.items = kept;
        Ok(outcome)
    }

    // =========================================================================
    // Command surface
    // =========================================================================

    pub async fn status(&self, tenant: &str) -> Result<GridStatus> {
        let (enabled, tripwire) = self.monitor.config().await;
        let policy = self.validator.policy().await;
        let active = self.honeyfacts.list_active(tenant).await?.len();
        let total = self.honeyfacts.list_all(tenant).await?.len();

        Ok(GridStatus {
            tenant: tenant.to_string(),
            enabled,
            fuzzy_enabled: tripwire.fuzzy_enabled,
            fuzzy_threshold: tripwire.fuzzy_threshold,
            policy_version: policy.version,
            strict_mode: policy.strict_mode,
            honeyfacts_active: active,
            honeyfacts_total: total,
            incidents: self.monitor.incident_stats(tenant).await?,
            containment: self.containment.get_status(tenant).await?,
        })
    }

    /// Plant honeyfacts; `None` uses the configured count.
    pub async fn seed(&self, tenant: &str, count: Option<usize>) -> Result<SeedResult> {
        let count = match count {
            Some(count) => count,
            None => self.config.read().await.honeyfacts.count,
        };
        let seeded = self.honeyfacts.seed(tenant, count).await?;
        Ok(SeedResult {
            success: true,
            message: format!("Seeded {} honeyfacts for {}", seeded.len(), tenant),
            seeded,
        })
    }

    pub async fn rotate(&self, tenant: &str) -> Result<RotationSummary> {
        self.honeyfacts.rotate(tenant).await
    }

    pub async fn clear_honeyfacts(&self, tenant: &str) -> Result<ClearResult> {
        let removed = self.honeyfacts.clear(tenant).await?;
        Ok(ClearResult {
            success: true,
            message: format!("Removed {} honeyfacts for {}", removed, tenant),
            removed,
        })
    }

    pub async fn list_incidents(
        &self,
        tenant: &str,
        status: Option<IncidentStatus>,
    ) -> Result<Vec<Incident>> {
        self.monitor.list_incidents(tenant, status).await
    }

    pub async fn show_incident(&self, tenant: &str, id: &str) -> Result<IncidentResult> {
        Ok(match self.monitor.get_incident(tenant, id).await? {
            Some(incident) => IncidentResult {
                success: true,
                message: format!("Incident {}", id),
                incident: Some(incident),
            },
            None => IncidentResult::failure(format!("Incident {} not found", id)),
        })
    }

    pub async fn update_incident(
        &self,
        tenant: &str,
        id: &str,
        update: IncidentUpdate,
    ) -> Result<IncidentResult> {
        self.monitor.update_incident(tenant, id, update).await
    }

    pub async fn quarantine(
        &self,
        tenant: &str,
        target_type: TargetType,
        request: QuarantineRequest,
    ) -> Result<ContainmentResult> {
        match target_type {
            TargetType::Memory => self.containment.quarantine_memory(tenant, request).await,
            TargetType::Agent => self.containment.quarantine_agent(tenant, request).await,
        }
    }

    pub async fn release(
        &self,
        tenant: &str,
        target_type: TargetType,
        target_id: &str,
        released_by: Option<&str>,
        reason: &str,
    ) -> Result<ContainmentResult> {
        match target_type {
            TargetType::Memory => {
                self.containment
                    .release_memory(tenant, target_id, released_by, reason)
                    .await
            }
            TargetType::Agent => {
                self.containment
                    .release_agent(tenant, target_id, released_by, reason)
                    .await
            }
        }
    }

    /// Effective configuration, including runtime changes.
    pub async fn get_config(&self) -> GridConfig {
        let mut config = self.config.read().await.clone();
        let (enabled, tripwire) = self.monitor.config().await;
        config.enabled = enabled;
        config.tripwire = tripwire;
        config.containment = self.containment.config().await;
        config.integrity.strict_mode = self.validator.policy().await.strict_mode;
        config
    }

    /// Change one setting by key. Bad keys and values are reported, not thrown.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<ConfigChange> {
        let mut config = self.get_config().await;
        if let Err(message) = apply_setting(&mut config, key, value) {
            return Ok(ConfigChange::failure(key, value, message));
        }
        if let Err(e) = config.validate() {
            return Ok(ConfigChange::failure(key, value, e.to_string()));
        }

        self.monitor
            .configure(config.enabled, config.tripwire.clone())
            .await;
        self.containment.set_config(config.containment.clone()).await?;
        let mut policy = self.validator.policy().await;
        if policy.strict_mode != config.integrity.strict_mode {
            policy.strict_mode = config.integrity.strict_mode;
            self.validator.set_policy(policy).await?;
        }
        *self.config.write().await = config.clone();

        tracing::info!(key, value, "Configuration changed");
        Ok(ConfigChange {
            success: true,
            message: format!("{} = {}", key, value),
            key: key.to_string(),
            value: value.to_string(),
            config: Some(config),
        })
    }

    /// Run content through the tripwire as if the agent produced it.
    ///
    /// Nothing is recorded and containment never runs; the result shows the
    /// incident a real scan would have opened.
    pub async fn test_input(
        &self,
        tenant: &str,
        content: &str,
        source: DetectionSource,
    ) -> Result<TripwireResult> {
        self.monitor
            .dry_run(content, source, tenant, MatchContext::default())
            .await
    }
}

fn apply_setting(config: &mut GridConfig, key: &str, value: &str) -> std::result::Result<(), String> {
    fn parse_bool(value: &str) -> std::result::Result<bool, String> {
        match value {
            "true" | "on" | "yes" | "1" => Ok(true),
            "false" | "off" | "no" | "0" => Ok(false),
            other => Err(format!("expected a boolean, got {}", other)),
        }
    }

    match key {
        "enabled" => config.enabled = parse_bool(value)?,
        "tripwire.fuzzy_enabled" | "fuzzy_enabled" => {
            config.tripwire.fuzzy_enabled = parse_bool(value)?
        }
        "tripwire.fuzzy_threshold" | "fuzzy_threshold" => {
            config.tripwire.fuzzy_threshold = value
                .parse::<f64>()
                .map_err(|_| format!("expected a number, got {}", value))?
        }
        "containment.policy" | "policy" => {
            config.containment.policy = value.parse::<ContainmentPolicy>()?
        }
        "containment.auto_escalate_critical" | "auto_escalate_critical" => {
            config.containment.auto_escalate_critical = parse_bool(value)?
        }
        "containment.auto_quarantine_threshold" | "auto_quarantine_threshold" => {
            config.containment.auto_quarantine_threshold = value.parse::<Severity>()?
        }
        "integrity.strict_mode" | "strict_mode" => config.integrity.strict_mode = parse_bool(value)?,
        other => {
            return Err(format!(
                "unknown config key {}; expected one of {}",
                other,
                CONFIG_KEYS.join(", ")
            ))
        }
    }
    Ok(())
}

/// Builder for [`MemoryIntegrityGrid`]
pub struct GridBuilder {
    config: GridConfig,
    backend: Option<Arc<dyn Backend>>,
}

impl GridBuilder {
    pub fn new() -> Self {
        Self {
            config: GridConfig::default(),
            backend: None,
        }
    }

    pub fn config(mut self, config: GridConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy(mut self, policy: ContainmentPolicy) -> Self {
        self.config.containment.policy = policy;
        self
    }

    pub fn tripwire(mut self, tripwire: TripwireConfig) -> Self {
        self.config.tripwire = tripwire;
        self
    }

    pub fn strict_mode(mut self, strict: bool) -> Self {
        self.config.integrity.strict_mode = strict;
        self
    }

    /// Use this backend instead of the one named by the storage config
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<MemoryIntegrityGrid> {
        match self.backend {
            Some(backend) => MemoryIntegrityGrid::with_backend(self.config, backend),
            None => MemoryIntegrityGrid::new(self.config),
        }
    }
}

impl Default for GridBuilder {
    fn default() -> Self {
        Self::new()
    }
}
