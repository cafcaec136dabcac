//! Evidence bundles
//!
//! A bundle anchors a memory's provenance: a list of artifacts plus a
//! SHA-256 hash over their canonical JSON form. Items are converted to a
//! `serde_json::Value` first, which orders object keys, so the hash does not
//! depend on field declaration order.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One artifact backing a memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Artifact kind, e.g. `conversation`, `document`, `tool_result`
    #[serde(rename = "type")]
    pub kind: String,
    pub reference: String,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl EvidenceItem {
    /// Build an item whose hash is computed from `content`.
    pub fn from_content(kind: impl Into<String>, reference: impl Into<String>, content: &[u8]) -> Self {
        Self {
            kind: kind.into(),
            reference: reference.into(),
            content_hash: sha256_hex(content),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub id: String,
    pub items: Vec<EvidenceItem>,
    /// Hash over the canonicalized items
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl EvidenceBundle {
    pub fn new(items: Vec<EvidenceItem>) -> Result<Self> {
        let hash = hash_items(&items)?;
        Ok(Self {
            id: format!("evb-{}", uuid::Uuid::new_v4()),
            items,
            hash,
            created_at: Utc::now(),
        })
    }

    /// Hash the current items again.
    pub fn recompute_hash(&self) -> Result<String> {
        hash_items(&self.items)
    }

    /// Whether the stored hash still matches the items.
    pub fn verify(&self) -> bool {
        match self.recompute_hash() {
            Ok(hash) => hash == self.hash,
            Err(e) => {
                tracing::warn!(bundle_id = %self.id, "Failed to hash evidence bundle: {}", e);
                false
            }
        }
    }
}

/// Lower-case hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn hash_items(items: &[EvidenceItem]) -> Result<String> {
    let canonical = serde_json::to_value(items)?;
    Ok(sha256_hex(serde_json::to_string(&canonical)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<EvidenceItem> {
        vec![
            EvidenceItem::from_content("conversation", "conv-1#12", b"user said hello"),
            EvidenceItem::from_content("document", "kb/handbook.md", b"handbook v3"),
        ]
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_new_bundle_verifies() {
        let bundle = EvidenceBundle::new(items()).unwrap();
        assert!(bundle.id.starts_with("evb-"));
        assert_eq!(bundle.hash.len(), 64);
        assert!(bundle.verify());
        assert_eq!(bundle.recompute_hash().unwrap(), bundle.hash);
    }

    #[test]
    fn test_tampering_is_detected() {
        let mut bundle = EvidenceBundle::new(items()).unwrap();
        bundle.items[1].reference = "kb/forged.md".to_string();
        assert!(!bundle.verify());

        let mut bundle = EvidenceBundle::new(items()).unwrap();
        bundle.items.pop();
        assert!(!bundle.verify());
    }

    #[test]
    fn test_hash_is_order_sensitive_but_deterministic() {
        let items = items();
        let a = EvidenceBundle::new(items.clone()).unwrap();
        let b = EvidenceBundle::new(items.clone()).unwrap();
        assert_eq!(a.hash, b.hash);

        let mut reversed = items;
        reversed.reverse();
        let c = EvidenceBundle::new(reversed).unwrap();
        assert_ne!(a.hash, c.hash);
    }
}
