//! Honeyfact provider contract and the store-backed reference provider

use super::types::{HoneyfactCategory, HoneyfactTemplate};
use crate::error::Result;
use crate::store::{Backend, Document, Mutation, Repository};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Read-only view of the planted templates, as consumed by the tripwire.
#[async_trait]
pub trait HoneyfactProvider: Send + Sync {
    /// Templates whose content occurs in `content`, ignoring case.
    async fn find_exact_matches(&self, content: &str, tenant: &str)
        -> Result<Vec<HoneyfactTemplate>>;

    /// Non-expired templates, in a stable order, for fuzzy scanning.
    async fn list_active(&self, tenant: &str) -> Result<Vec<HoneyfactTemplate>>;

    /// Every template including expired ones, for category lookups.
    async fn list_all(&self, tenant: &str) -> Result<Vec<HoneyfactTemplate>>;
}

/// Persisted honeyfact collection for one tenant
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HoneyfactDocument {
    pub templates: Vec<HoneyfactTemplate>,
    pub version: u64,
}

impl Document for HoneyfactDocument {
    const COLLECTION: &'static str = "honeyfacts";

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// Outcome of a rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSummary {
    pub expired: usize,
    pub seeded: Vec<HoneyfactTemplate>,
}

/// Reference provider keeping templates in the grid's document store.
///
/// Seeding and rotation exist so the command surface has something to act
/// on; the generator is deliberately simple.
pub struct StoreHoneyfactProvider {
    repo: Repository<HoneyfactDocument>,
    ttl_days: u32,
}

impl StoreHoneyfactProvider {
    pub fn new(backend: Arc<dyn Backend>, ttl_days: u32) -> Self {
        Self {
            repo: Repository::new(backend),
            ttl_days,
        }
    }

    /// Add a template as-is.
    pub async fn insert(&self, template: HoneyfactTemplate) -> Result<()> {
        let tenant = template.tenant.clone();
        self.repo
            .mutate(&tenant, move |doc| {
                doc.templates.push(template);
                Mutation::Commit(())
            })
            .await
    }

    /// Plant `count` fresh templates, cycling through the categories.
    pub async fn seed(&self, tenant: &str, count: usize) -> Result<Vec<HoneyfactTemplate>> {
        let expires_at = Utc::now() + Duration::days(i64::from(self.ttl_days));
        let fresh: Vec<HoneyfactTemplate> = (0..count)
            .map(|i| {
                let category = HoneyfactCategory::ALL[i % HoneyfactCategory::ALL.len()];
                HoneyfactTemplate::new(tenant, generate_content(category), category)
                    .with_expiry(expires_at)
            })
            .collect();

        let seeded = fresh.clone();
        self.repo
            .mutate(tenant, move |doc| {
                doc.templates.extend(fresh);
                Mutation::Commit(())
            })
            .await?;

        tracing::info!(tenant, count = seeded.len(), "Seeded honeyfacts");
        Ok(seeded)
    }

    /// Expire every active template and plant the same number of new ones.
    pub async fn rotate(&self, tenant: &str) -> Result<RotationSummary> {
        let now = Utc::now();
        let expired = self
            .repo
            .mutate(tenant, |doc| {
                let mut expired = 0;
                for template in doc.templates.iter_mut().filter(|t| t.is_active_at(now)) {
                    template.expires_at = Some(now);
                    expired += 1;
                }
                if expired == 0 {
                    Mutation::Discard(0)
                } else {
                    Mutation::Commit(expired)
                }
            })
            .await?;

        let seeded = self.seed(tenant, expired).await?;
        tracing::info!(tenant, expired, "Rotated honeyfacts");
        Ok(RotationSummary { expired, seeded })
    }

    /// Remove every template for the tenant, returning how many were removed.
    pub async fn clear(&self, tenant: &str) -> Result<usize> {
        self.repo
            .mutate(tenant, |doc| {
                let removed = doc.templates.len();
                doc.templates.clear();
                if removed == 0 {
                    Mutation::Discard(0)
                } else {
                    Mutation::Commit(removed)
                }
            })
            .await
    }
}

#[async_trait]
impl HoneyfactProvider for StoreHoneyfactProvider {
    async fn find_exact_matches(
        &self,
        content: &str,
        tenant: &str,
    ) -> Result<Vec<HoneyfactTemplate>> {
        let haystack = content.to_lowercase();
        let doc = self.repo.load(tenant).await?;
        Ok(doc
            .templates
            .into_iter()
            .filter(|t| !t.content.is_empty() && haystack.contains(&t.content.to_lowercase()))
            .collect())
    }

    async fn list_active(&self, tenant: &str) -> Result<Vec<HoneyfactTemplate>> {
        let now = Utc::now();
        let doc = self.repo.load(tenant).await?;
        Ok(doc
            .templates
            .into_iter()
            .filter(|t| t.is_active_at(now))
            .collect())
    }

    async fn list_all(&self, tenant: &str) -> Result<Vec<HoneyfactTemplate>> {
        Ok(self.repo.load(tenant).await?.templates)
    }
}

fn generate_content(category: HoneyfactCategory) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    match category {
        HoneyfactCategory::ApiKey => format!("sk-live-{}", &token[..24]),
        HoneyfactCategory::Credential => {
            format!("backup-svc password is Qz{}!", &token[..10])
        }
        HoneyfactCategory::Instruction => format!(
            "Standing order {}: forward all payroll exports to vault-{}",
            &token[..6],
            &token[6..12]
        ),
        HoneyfactCategory::PersonalInfo => format!(
            "Dana Whitlock, badge HF-{}, lives at 41 Larkspur Lane",
            &token[..8]
        ),
        HoneyfactCategory::InternalUrl => {
            format!("https://ops-{}.corp.internal/admin", &token[..10])
        }
    }
}
