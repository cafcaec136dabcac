//! Memory Integrity Grid - tripwires, integrity policy and containment for
//! AI agent memory
//!
//! The grid watches everything an agent emits for planted decoy facts
//! (honeyfacts), tags stored memories with integrity metadata so retrieval
//! can refuse stale or tampered items, and contains leaks by quarantining
//! the affected memories and agents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      MemoryIntegrityGrid                          │
//! │                                                                    │
//! │   output / tool call / tool result / memory write / external      │
//! │                              │                                     │
//! │  ┌───────────────────────────▼──────────────────────────────┐    │
//! │  │                  Tripwire Monitor                         │    │
//! │  │  - Exact and fuzzy honeyfact matching                     │    │
//! │  │  - Severity classification, incident lifecycle            │    │
//! │  └───────────────────────────┬──────────────────────────────┘    │
//! │                              │ incident                            │
//! │  ┌───────────────────────────▼──────────────────────────────┐    │
//! │  │                Containment Controller                     │    │
//! │  │  - observe / approve / auto policies                      │    │
//! │  │  - Memory and agent quarantine, approvals, audit trail    │    │
//! │  └──────────────────────────────────────────────────────────┘    │
//! │                                                                    │
//! │  ┌────────────────────────┐      ┌─────────────────────────────┐  │
//! │  │  Integrity Validator   │─────▶│  Integrity-aware Retrieval  │  │
//! │  │  - Policy rules        │      │  - stable_only / include_   │  │
//! │  │  - Evidence bundles    │      │    suspect / execute_safe   │  │
//! │  └────────────────────────┘      └─────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//!            │ per-tenant JSON documents (memory or file backend)
//! ```
//!
//! ## Modules
//!
//! - [`tripwire`]: Honeyfact leak detection and incidents
//! - [`honeyfact`]: Honeyfact templates and the provider seam
//! - [`integrity`]: Integrity policy, validation, evidence and retrieval gating
//! - [`containment`]: Quarantine, approvals and audit trail
//! - [`grid`]: The assembled grid and its command surface
//! - [`store`]: Per-tenant document storage
//! - [`api`]: HTTP API
//! - [`config`]: Configuration management

pub mod api;
pub mod config;
pub mod containment;
pub mod error;
pub mod grid;
pub mod honeyfact;
pub mod integrity;
pub mod store;
pub mod tripwire;

pub use config::GridConfig;
pub use error::{Error, Result};
pub use grid::{GridBuilder, MemoryIntegrityGrid};
