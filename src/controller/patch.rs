//! Deferred status patching for MachineHealthCheck
//!
//! A reconciliation pass mutates a working copy of the health check and
//! the scope computes the minimal patches against the snapshot taken at
//! the start of the pass. The patch is applied once, at the end, whether
//! the pass succeeded or failed, so partial progress (fresh counts, the
//! admission condition) is never lost to a mid-pass error.

use kube::{
    api::{Api, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::{json, Value};

use crate::crd::MachineHealthCheck;
use crate::error::Result;

const FIELD_MANAGER: &str = "fleet-health";

/// Snapshot-and-working-copy pair for one reconciliation pass
pub struct PatchScope {
    original: MachineHealthCheck,
    /// Working copy the pass mutates freely
    pub mhc: MachineHealthCheck,
}

impl PatchScope {
    pub fn new(mhc: MachineHealthCheck) -> Self {
        Self {
            original: mhc.clone(),
            mhc,
        }
    }

    /// Metadata merge patch, or `None` when labels and owner references
    /// are unchanged
    pub fn metadata_diff(&self) -> Option<Value> {
        let unchanged = self.original.metadata.labels == self.mhc.metadata.labels
            && self.original.metadata.owner_references == self.mhc.metadata.owner_references;
        if unchanged {
            return None;
        }
        Some(json!({
            "metadata": {
                "labels": self.mhc.metadata.labels,
                "ownerReferences": self.mhc.metadata.owner_references,
            }
        }))
    }

    /// Status merge patch, or `None` when the status is unchanged
    pub fn status_diff(&self) -> Option<Value> {
        let original = serde_json::to_value(&self.original.status).ok()?;
        let current = serde_json::to_value(&self.mhc.status).ok()?;
        if original == current {
            return None;
        }
        Some(json!({ "status": current }))
    }

    /// Apply whatever changed during the pass. A no-op pass issues no
    /// API calls at all.
    pub async fn apply(&self, client: &Client) -> Result<()> {
        let namespace = self.mhc.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<MachineHealthCheck> = Api::namespaced(client.clone(), &namespace);
        let params = PatchParams::apply(FIELD_MANAGER);

        if let Some(patch) = self.metadata_diff() {
            api.patch(&self.mhc.name_any(), &params, &Patch::Merge(&patch))
                .await?;
        }
        if let Some(patch) = self.status_diff() {
            api.patch_status(&self.mhc.name_any(), &params, &Patch::Merge(&patch))
                .await?;
        }
        Ok(())
    }
}
