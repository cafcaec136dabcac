//! Leak containment
//!
//! [`ContainmentController`] quarantines suspect memories and agents under a
//! process-wide policy (observe, approve or auto), keeps the approval queue,
//! and appends every decision to an immutable audit trail.

pub mod controller;
pub mod handler;
pub mod types;

pub use controller::ContainmentController;
pub use handler::{containment_router, ContainmentState};
pub use types::{
    ActionKind, ContainmentDocument, ContainmentEvent, ContainmentPolicy, ContainmentResult,
    ContainmentStatus, PendingApproval, QuarantineRecord, QuarantineRequest, QuarantineStatus,
    TargetType,
};
