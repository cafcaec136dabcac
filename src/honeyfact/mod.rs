//! Honeyfact (canary) templates
//!
//! The tripwire only reads templates through [`HoneyfactProvider`]. The
//! bundled [`StoreHoneyfactProvider`] keeps them in the grid's document store
//! and backs the seed / rotate / clear commands.

pub mod provider;
pub mod types;

pub use provider::{HoneyfactDocument, HoneyfactProvider, RotationSummary, StoreHoneyfactProvider};
pub use types::{HoneyfactCategory, HoneyfactTemplate};
