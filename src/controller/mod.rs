//! Controller module for MachineHealthCheck reconciliation
//!
//! This module contains the main controller loop, target classification,
//! the remediation circuit breaker and event routing.

mod admission;
mod events;
pub mod metrics;
mod patch;
mod reconciler;
mod remediation;
pub mod router;
mod targets;

pub use admission::is_allowed_remediation;
pub use events::{
    publish, EventType, EVENT_MACHINE_MARKED_UNHEALTHY, EVENT_RECONCILE_ERROR,
    EVENT_REMEDIATION_RESTRICTED,
};
pub use patch::PatchScope;
pub use reconciler::{run_controller, Context};
pub use remediation::mark_for_remediation;
pub use targets::{
    classify_targets, evaluate_target, resolve_targets, ClassifiedTargets, Target, TargetHealth,
};
