//! Honeyfact template types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of decoy a template imitates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoneyfactCategory {
    ApiKey,
    Credential,
    Instruction,
    PersonalInfo,
    InternalUrl,
}

impl HoneyfactCategory {
    pub const ALL: [HoneyfactCategory; 5] = [
        Self::ApiKey,
        Self::Credential,
        Self::Instruction,
        Self::PersonalInfo,
        Self::InternalUrl,
    ];

    /// Categories whose leakage is at least high severity
    pub fn is_high_risk(&self) -> bool {
        matches!(self, Self::ApiKey | Self::Instruction)
    }
}

impl std::fmt::Display for HoneyfactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey => write!(f, "api_key"),
            Self::Credential => write!(f, "credential"),
            Self::Instruction => write!(f, "instruction"),
            Self::PersonalInfo => write!(f, "personal_info"),
            Self::InternalUrl => write!(f, "internal_url"),
        }
    }
}

impl std::str::FromStr for HoneyfactCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_key" => Ok(Self::ApiKey),
            "credential" => Ok(Self::Credential),
            "instruction" => Ok(Self::Instruction),
            "personal_info" => Ok(Self::PersonalInfo),
            "internal_url" => Ok(Self::InternalUrl),
            other => Err(format!("unknown honeyfact category: {}", other)),
        }
    }
}

/// A planted decoy fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoneyfactTemplate {
    pub id: String,
    pub tenant: String,
    pub content: String,
    pub category: HoneyfactCategory,
    pub created_at: DateTime<Utc>,
    /// `None` means the template never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl HoneyfactTemplate {
    pub fn new(
        tenant: impl Into<String>,
        content: impl Into<String>,
        category: HoneyfactCategory,
    ) -> Self {
        Self {
            id: format!("hf-{}", uuid::Uuid::new_v4()),
            tenant: tenant.into(),
            content: content.into(),
            category,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the template is still planted at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > now)
    }
}
