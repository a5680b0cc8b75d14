//! Remediation signaling
//!
//! This operator never deletes or recreates machines itself. Marking a
//! machine unhealthy means setting the remediation-requested condition on
//! its status; a downstream remediation controller watches for that
//! condition and owns the actual replacement.

use kube::{
    api::{Api, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::info;

use crate::controller::events::{self, EventType, EVENT_MACHINE_MARKED_UNHEALTHY};
use crate::crd::{set_condition, Condition, Machine, MachineHealthCheck, MachineStatus};
use crate::error::Result;

/// Mark one machine for remediation.
///
/// Sets the remediation-requested condition on the machine's status and
/// records an event against the machine. The condition write is
/// idempotent: a machine already marked gets no second status patch and
/// keeps its original transition time, but the event is emitted on every
/// pass so the ongoing verdict stays visible.
pub async fn mark_for_remediation(
    client: &Client,
    mhc: &MachineHealthCheck,
    machine: &Machine,
    reason: &str,
) -> Result<()> {
    let namespace = machine.namespace().unwrap_or_else(|| "default".to_string());

    let mut status = machine.status.clone().unwrap_or_else(MachineStatus::default);
    let changed = set_condition(
        &mut status.conditions,
        Condition::remediation_requested(reason),
    );

    if changed {
        let machines: Api<Machine> = Api::namespaced(client.clone(), &namespace);
        let patch = json!({ "status": { "conditions": status.conditions } });
        machines
            .patch_status(
                &machine.name_any(),
                &PatchParams::apply("fleet-health"),
                &Patch::Merge(&patch),
            )
            .await?;
        info!(
            machine = %machine.name_any(),
            health_check = %mhc.name_any(),
            reason,
            "marked machine for remediation"
        );
    }

    // The event lands on the machine so its describe output carries the
    // verdict; the message records which health check made the call.
    events::publish(
        client,
        machine,
        EventType::Normal,
        EVENT_MACHINE_MARKED_UNHEALTHY,
        &format!(
            "Machine has been marked as unhealthy by health check {}: {}",
            mhc.name_any(),
            reason
        ),
    )
    .await?;

    Ok(())
}
