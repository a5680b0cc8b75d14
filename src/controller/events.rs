//! Kubernetes Event emission for health-check decisions

use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{Api, ObjectMeta, PostParams},
    Client, Resource, ResourceExt,
};
use tracing::info;

use crate::error::{Error, Result};

/// A machine failed its health check and was marked for remediation
pub const EVENT_MACHINE_MARKED_UNHEALTHY: &str = "MachineMarkedUnhealthy";

/// Remediation was withheld by the maxUnhealthy circuit breaker
pub const EVENT_REMEDIATION_RESTRICTED: &str = "RemediationRestricted";

/// A reconciliation pass failed
pub const EVENT_RECONCILE_ERROR: &str = "ReconcileError";

/// Whether an event records normal operation or a problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

/// Build a Kubernetes Event attached to the given object
pub fn build_event<K>(object: &K, type_: EventType, reason: &str, message: &str) -> Event
where
    K: Resource<DynamicType = ()>,
{
    let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
    let time = Utc::now();

    let obj_ref = ObjectReference {
        api_version: Some(K::api_version(&()).to_string()),
        kind: Some(K::kind(&()).to_string()),
        name: Some(object.name_any()),
        namespace: Some(namespace.clone()),
        uid: object.meta().uid.clone(),
        ..Default::default()
    };

    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", object.name_any())),
            namespace: Some(namespace),
            ..Default::default()
        },
        type_: Some(type_.as_str().to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: obj_ref,
        first_timestamp: Some(Time(time)),
        last_timestamp: Some(Time(time)),
        count: Some(1),
        ..Default::default()
    }
}

/// Emit a Kubernetes Event attached to the given object
pub async fn publish<K>(
    client: &Client,
    object: &K,
    type_: EventType,
    reason: &str,
    message: &str,
) -> Result<()>
where
    K: Resource<DynamicType = ()>,
{
    let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
    let events: Api<Event> = Api::namespaced(client.clone(), &namespace);
    let event = build_event(object, type_, reason, message);

    events
        .create(&PostParams::default(), &event)
        .await
        .map_err(Error::KubeError)?;

    info!(
        "Emitted {} event for {}/{}: {}",
        reason,
        namespace,
        object.name_any(),
        message
    );

    Ok(())
}
