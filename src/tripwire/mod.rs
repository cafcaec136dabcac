//! Honeyfact tripwire
//!
//! Scans agent output, tool traffic, memory writes and outbound requests for
//! planted honeyfacts. A hit becomes a [`DetectionEvent`]; all events of one
//! scan are grouped into an [`Incident`] whose severity drives containment.

pub mod fuzzy;
pub mod handler;
pub mod monitor;
pub mod severity;
pub mod types;

pub use handler::{tripwire_router, TripwireState};
pub use monitor::TripwireMonitor;
pub use types::{
    DetectionEvent, DetectionSource, Incident, IncidentDocument, IncidentKind, IncidentResult,
    IncidentStats, IncidentStatus, IncidentUpdate, MatchContext, Severity, TripwireResult,
};
