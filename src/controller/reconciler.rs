//! MachineHealthCheck controller
//!
//! One reconciliation pass resolves the governed targets, classifies them
//! against the policy's rules, runs the admission check and either marks
//! the unhealthy machines for remediation or records why it will not.
//! Status is written through a deferred patch scope at the end of the pass
//! regardless of how the pass went.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        reflector,
        watcher::{watcher, Config},
        WatchStreamExt,
    },
    Resource, ResourceExt,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{
    set_condition, Condition, FleetCluster, Machine, MachineHealthCheck, MachineHealthCheckStatus,
    CLUSTER_NAME_LABEL, PAUSED_ANNOTATION,
};
use crate::error::{Error, Result};
use crate::remote::WorkloadClusters;

use super::admission::is_allowed_remediation;
use super::events::{self, EventType, EVENT_RECONCILE_ERROR, EVENT_REMEDIATION_RESTRICTED};
use super::metrics;
use super::patch::PatchScope;
use super::remediation::mark_for_remediation;
use super::router;
use super::targets::{classify_targets, resolve_targets};

/// How long to wait before re-running a pass the circuit breaker denied
const REMEDIATION_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state for the controller
pub struct Context {
    pub client: Client,
    pub workload_clusters: WorkloadClusters,
}

/// Main entry point to start the controller
pub async fn run_controller(client: Client) -> Result<()> {
    let health_checks: Api<MachineHealthCheck> = Api::all(client.clone());

    info!("Starting MachineHealthCheck controller");

    // Verify CRD exists
    match health_checks.list(&Default::default()).await {
        Ok(_) => info!("MachineHealthCheck CRD is available"),
        Err(e) => {
            error!(
                "MachineHealthCheck CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "MachineHealthCheck CRD not installed".to_string(),
            ));
        }
    }

    let controller = Controller::new(health_checks, Config::default());
    let mhc_store = controller.store();

    // Reflect all Machines so the node and machine mappers can run against
    // a local snapshot instead of querying the API server per event.
    let (machine_reader, machine_writer) = reflector::store::<Machine>();
    let machine_stream = reflector::reflector(
        machine_writer,
        watcher(Api::<Machine>::all(client.clone()), Config::default()).default_backoff(),
    )
    .touched_objects();
    tokio::spawn(async move {
        machine_stream
            .for_each(|res| async {
                if let Err(err) = res {
                    warn!(error = %err, "machine reflector error");
                }
            })
            .await;
    });

    // Node events from the workload clusters arrive over this channel as
    // pre-resolved health-check references.
    let (node_trigger, node_events) = futures::channel::mpsc::channel(128);

    let workload_clusters = WorkloadClusters::new(
        client.clone(),
        node_trigger,
        machine_reader.clone(),
        mhc_store.clone(),
    );
    let context = Arc::new(Context {
        client: client.clone(),
        workload_clusters,
    });

    let cluster_store = mhc_store.clone();
    let machine_mapper_store = mhc_store.clone();

    controller
        .watches(
            Api::<FleetCluster>::all(client.clone()),
            Config::default(),
            move |cluster| router::cluster_to_health_checks(&cluster, &cluster_store.state()),
        )
        .watches(
            Api::<Machine>::all(client.clone()),
            Config::default(),
            move |machine| router::machine_to_health_checks(&machine, &machine_mapper_store.state()),
        )
        .reconcile_on(node_events)
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// The main reconciliation function
///
/// Runs whenever the MachineHealthCheck itself changes, its FleetCluster
/// or a governed Machine changes, a workload-cluster Node event routes to
/// it, or a requeue timer expires.
#[instrument(skip(ctx, mhc), fields(name = %mhc.name_any(), namespace = mhc.namespace()))]
async fn reconcile(mhc: Arc<MachineHealthCheck>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = mhc.namespace().unwrap_or_else(|| "default".to_string());
    let cluster_name = router::policy_cluster_name(&mhc).to_string();

    let clusters: Api<FleetCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let cluster = match clusters.get(&cluster_name).await {
        Ok(cluster) => cluster,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            // The owning cluster does not exist yet; its creation will
            // trigger us again.
            debug!(cluster = %cluster_name, "cluster not found, waiting");
            return Ok(Action::await_change());
        }
        Err(err) => return Err(err.into()),
    };

    if cluster.spec.paused || mhc.annotations().contains_key(PAUSED_ANNOTATION) {
        debug!("reconciliation is paused");
        return Ok(Action::await_change());
    }

    if let Err(reason) = mhc.spec.validate() {
        warn!(%reason, "invalid health check spec");
        events::publish(
            &ctx.client,
            mhc.as_ref(),
            EventType::Warning,
            EVENT_RECONCILE_ERROR,
            &format!("Invalid spec: {}", reason),
        )
        .await?;
        return Ok(Action::await_change());
    }

    let mut scope = PatchScope::new(MachineHealthCheck::clone(&mhc));
    ensure_cluster_metadata(&mut scope.mhc, &cluster);

    let result = reconcile_health(&ctx, &cluster, &mut scope).await;

    if let Err(err) = &result {
        // Best-effort: losing the event must not mask the original error
        if let Err(event_err) = events::publish(
            &ctx.client,
            mhc.as_ref(),
            EventType::Warning,
            EVENT_RECONCILE_ERROR,
            &err.to_string(),
        )
        .await
        {
            warn!(error = %event_err, "failed to emit reconcile error event");
        }
    }

    // Status is flushed whether the pass succeeded or not, and a patch
    // failure must not shadow the pass's own error.
    let patched = scope.apply(&ctx.client).await;
    Error::aggregate(result, patched)
}

/// Make the health check carry its cluster-name label and an owner
/// reference to its FleetCluster, so cluster deletion cascades and the
/// cluster mapper can route by label.
fn ensure_cluster_metadata(mhc: &mut MachineHealthCheck, cluster: &FleetCluster) {
    mhc.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(CLUSTER_NAME_LABEL.to_string(), cluster.name_any());

    let owner_refs = mhc.metadata.owner_references.get_or_insert_with(Vec::new);
    let already_owned = owner_refs
        .iter()
        .any(|r| Some(&r.uid) == cluster.metadata.uid.as_ref());
    if !already_owned {
        owner_refs.push(OwnerReference {
            api_version: FleetCluster::api_version(&()).to_string(),
            kind: FleetCluster::kind(&()).to_string(),
            name: cluster.name_any(),
            uid: cluster.metadata.uid.clone().unwrap_or_default(),
            controller: None,
            block_owner_deletion: None,
        });
    }
}

/// The health-check pass proper: resolve targets, classify, admit, signal.
async fn reconcile_health(
    ctx: &Context,
    cluster: &FleetCluster,
    scope: &mut PatchScope,
) -> Result<Action> {
    let workload = ctx.workload_clusters.reader_for(cluster).await?;
    ctx.workload_clusters
        .ensure_node_watch(cluster, workload.clone())
        .await;

    let targets = resolve_targets(&ctx.client, &workload, &scope.mhc).await?;
    let now = Utc::now();
    let expected_machines = targets.len() as i32;

    let mut target_names: Vec<String> = targets.iter().map(|t| t.machine.name_any()).collect();
    target_names.sort();

    let classified = classify_targets(targets, &scope.mhc.spec, now);
    let current_healthy = classified.healthy.len() as i32;

    let selector_string = scope.mhc.spec.selector.to_selector_string();
    let generation = scope.mhc.metadata.generation;
    let namespace = scope.mhc.namespace().unwrap_or_else(|| "default".to_string());
    let name = scope.mhc.name_any();

    // Status counts are recomputed from scratch each pass
    {
        let status = scope
            .mhc
            .status
            .get_or_insert_with(MachineHealthCheckStatus::default);
        status.expected_machines = expected_machines;
        status.current_healthy = current_healthy;
        status.targets = target_names;
        status.selector = selector_string;
        status.observed_generation = generation;
    }
    metrics::observe_pass(&namespace, &name, expected_machines, current_healthy);

    info!(
        expected = expected_machines,
        healthy = current_healthy,
        unhealthy = classified.unhealthy.len(),
        "classified targets"
    );

    let allowed = is_allowed_remediation(
        expected_machines,
        current_healthy,
        scope.mhc.spec.max_unhealthy.as_ref(),
    );

    if !allowed {
        let max_unhealthy = scope
            .mhc
            .spec
            .max_unhealthy
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();
        let message = format!(
            "Remediation restricted due to exceeded number of unhealthy machines (total: {}, unhealthy: {}, maxUnhealthy: {})",
            expected_machines,
            expected_machines - current_healthy,
            max_unhealthy
        );
        warn!("{}", message);

        if let Some(status) = scope.mhc.status.as_mut() {
            set_condition(
                &mut status.conditions,
                Condition::remediation_allowed(false, "TooManyUnhealthy", &message),
            );
        }
        metrics::observe_restricted(&namespace, &name);
        events::publish(
            &ctx.client,
            &scope.mhc,
            EventType::Warning,
            EVENT_REMEDIATION_RESTRICTED,
            &message,
        )
        .await?;

        // Deliberately a timed retry rather than waiting for an event:
        // recovery (machines turning healthy again) must lift the
        // restriction even if nothing else changes.
        return Ok(Action::requeue(REMEDIATION_RETRY_INTERVAL));
    }

    if let Some(status) = scope.mhc.status.as_mut() {
        set_condition(
            &mut status.conditions,
            Condition::remediation_allowed(true, "WithinLimit", "Remediation is allowed"),
        );
    }

    for (target, reason) in &classified.unhealthy {
        mark_for_remediation(&ctx.client, &scope.mhc, &target.machine, reason).await?;
        metrics::observe_remediation(&namespace, &name);
    }

    // Wake up when the earliest pending target could flip to unhealthy
    if let Some(next_check) = classified.next_check {
        let wait = (next_check - now).num_seconds().max(1) as u64;
        debug!(seconds = wait, "requeueing for pending targets");
        return Ok(Action::requeue(Duration::from_secs(wait)));
    }

    Ok(Action::await_change())
}

fn error_policy(mhc: Arc<MachineHealthCheck>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!("Reconciliation error for {}: {:?}", mhc.name_any(), error);

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
