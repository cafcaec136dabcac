//! Memory Integrity Grid configuration management

use crate::containment::ContainmentPolicy;
use crate::error::{Error, Result};
use crate::integrity::RetrievalMode;
use crate::tripwire::{DetectionSource, Severity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main grid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Master switch for the tripwire monitor
    pub enabled: bool,

    /// Tripwire (leak detection) configuration
    pub tripwire: TripwireConfig,

    /// Containment workflow configuration
    pub containment: ContainmentConfig,

    /// Integrity policy defaults
    pub integrity: IntegrityConfig,

    /// Reference honeyfact provider configuration
    pub honeyfacts: HoneyfactConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// HTTP API configuration
    pub api: ApiConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tripwire: TripwireConfig::default(),
            containment: ContainmentConfig::default(),
            integrity: IntegrityConfig::default(),
            honeyfacts: HoneyfactConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl GridConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GridConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// `~/.memgrid/config.toml`
    pub fn default_path() -> PathBuf {
        StorageConfig::default().base_dir.join("config.toml")
    }

    /// Reject values the grid cannot run with.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.tripwire.fuzzy_threshold;
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(Error::Config(format!(
                "tripwire.fuzzy_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.tripwire.monitored_sources.is_empty() {
            return Err(Error::Config(
                "tripwire.monitored_sources must not be empty".to_string(),
            ));
        }
        if self.integrity.freshness_secs == 0 {
            return Err(Error::Config(
                "integrity.freshness_secs must be greater than zero".to_string(),
            ));
        }
        if self.containment.default_agent_id.trim().is_empty() {
            return Err(Error::Config(
                "containment.default_agent_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tripwire configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripwireConfig {
    /// Run the fuzzy pass when no exact match is found
    pub fuzzy_enabled: bool,

    /// Minimum similarity (0-1) for a fuzzy match
    pub fuzzy_threshold: f64,

    /// Sources the monitor inspects; anything else is ignored
    pub monitored_sources: Vec<DetectionSource>,

    /// Characters of context kept on each side of a match
    pub snippet_radius: usize,
}

impl Default for TripwireConfig {
    fn default() -> Self {
        Self {
            fuzzy_enabled: true,
            fuzzy_threshold: 0.8,
            monitored_sources: DetectionSource::ALL.to_vec(),
            snippet_radius: 40,
        }
    }
}

/// Containment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentConfig {
    /// Automation policy
    pub policy: ContainmentPolicy,

    /// Quarantine the originating agent on critical incidents
    pub auto_escalate_critical: bool,

    /// Minimum incident severity that forces quarantine under `auto`
    pub auto_quarantine_threshold: Severity,

    /// Agent id used when an incident carries no session id
    pub default_agent_id: String,

    /// Operations blocked for a quarantined agent
    pub blocked_operations: Vec<String>,
}

impl Default for ContainmentConfig {
    fn default() -> Self {
        Self {
            policy: ContainmentPolicy::Approve,
            auto_escalate_critical: true,
            auto_quarantine_threshold: Severity::High,
            default_agent_id: "unknown-agent".to_string(),
            blocked_operations: vec![
                "memory_write".to_string(),
                "memory_read".to_string(),
                "tool_call".to_string(),
                "external_request".to_string(),
            ],
        }
    }
}

/// Integrity policy defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Escalate error-severity rule failures to `invalid`
    pub strict_mode: bool,

    /// Retrieval mode applied when callers do not name one
    pub default_mode: RetrievalMode,

    /// Freshness window for `execute_safe`, in seconds
    pub freshness_secs: u64,

    /// Maximum age accepted by the default TTL rule, in seconds
    pub default_ttl_secs: u64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            default_mode: RetrievalMode::IncludeSuspect,
            freshness_secs: 3600,
            default_ttl_secs: 30 * 24 * 3600,
        }
    }
}

/// Reference honeyfact provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoneyfactConfig {
    /// Templates created per seed
    pub count: usize,

    /// Lifetime of a seeded template in days
    pub ttl_days: u32,
}

impl Default for HoneyfactConfig {
    fn default() -> Self {
        Self {
            count: 5,
            ttl_days: 30,
        }
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// JSON documents on disk (default)
    #[default]
    File,

    /// Process memory only
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type
    pub backend: StorageBackend,

    /// Base directory for the file backend
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            base_dir: dirs_next::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".memgrid"),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18795,
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridConfig::default();
        assert!(config.enabled);
        assert!(config.tripwire.fuzzy_enabled);
        assert_eq!(config.tripwire.fuzzy_threshold, 0.8);
        assert_eq!(config.tripwire.monitored_sources.len(), 5);
        assert_eq!(config.containment.policy, ContainmentPolicy::Approve);
        assert!(config.containment.auto_escalate_critical);
        assert_eq!(config.integrity.freshness_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = GridConfig::default();
        config.tripwire.fuzzy_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fuzzy_threshold"));
    }

    #[test]
    fn test_validate_rejects_empty_sources() {
        let mut config = GridConfig::default();
        config.tripwire.monitored_sources.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            enabled = false

            [tripwire]
            fuzzy_threshold = 0.9

            [containment]
            policy = "auto"
        "#;
        let config: GridConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.tripwire.fuzzy_threshold, 0.9);
        assert!(config.tripwire.fuzzy_enabled);
        assert_eq!(config.containment.policy, ContainmentPolicy::Auto);
        assert_eq!(config.containment.auto_quarantine_threshold, Severity::High);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memgrid.toml");
        std::fs::write(
            &path,
            "[tripwire]\nmonitored_sources = [\"output\", \"external\"]\n",
        )
        .unwrap();

        let config = GridConfig::load(&path).unwrap();
        assert_eq!(
            config.tripwire.monitored_sources,
            vec![DetectionSource::Output, DetectionSource::External]
        );
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memgrid.toml");
        std::fs::write(&path, "[tripwire]\nfuzzy_threshold = -0.1\n").unwrap();
        assert!(matches!(GridConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = GridConfig::default();
        config.containment.policy = ContainmentPolicy::Observe;
        config.save(&path).unwrap();

        let loaded = GridConfig::load(&path).unwrap();
        assert_eq!(loaded.containment.policy, ContainmentPolicy::Observe);
        assert!(GridConfig::default_path().ends_with(".memgrid/config.toml"));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = GridConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: GridConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.containment, config.containment);
    }
}
