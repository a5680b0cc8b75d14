//! Workload-cluster access
//!
//! The operator runs against the management cluster but the Nodes it
//! inspects live in the workload clusters. Each FleetCluster publishes its
//! kubeconfig in a `<name>-kubeconfig` Secret; this module builds clients
//! from those secrets, caches them, and keeps one Node watch per workload
//! cluster alive to feed node events back into the controller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::{
    api::Api,
    config::{KubeConfigOptions, Kubeconfig},
    runtime::{
        reflector::{ObjectRef, Store},
        watcher, WatchStreamExt,
    },
    Client, Config, ResourceExt,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::controller::router;
use crate::crd::{FleetCluster, Machine, MachineHealthCheck};
use crate::error::{Error, Result};

/// Key of the kubeconfig payload inside the cluster Secret
const KUBECONFIG_SECRET_KEY: &str = "value";

/// Cached clients and node watches for the workload clusters
#[derive(Clone)]
pub struct WorkloadClusters {
    client: Client,
    clients: Arc<RwLock<HashMap<String, Client>>>,
    watched: Arc<Mutex<HashSet<String>>>,
    trigger: futures::channel::mpsc::Sender<ObjectRef<MachineHealthCheck>>,
    machines: Store<Machine>,
    health_checks: Store<MachineHealthCheck>,
}

impl WorkloadClusters {
    pub fn new(
        client: Client,
        trigger: futures::channel::mpsc::Sender<ObjectRef<MachineHealthCheck>>,
        machines: Store<Machine>,
        health_checks: Store<MachineHealthCheck>,
    ) -> Self {
        Self {
            client,
            clients: Arc::new(RwLock::new(HashMap::new())),
            watched: Arc::new(Mutex::new(HashSet::new())),
            trigger,
            machines,
            health_checks,
        }
    }

    fn cache_key(cluster: &FleetCluster) -> String {
        format!(
            "{}/{}",
            cluster.namespace().unwrap_or_default(),
            cluster.name_any()
        )
    }

    /// Client for the given workload cluster, built from its kubeconfig
    /// Secret on first use and cached afterwards.
    pub async fn reader_for(&self, cluster: &FleetCluster) -> Result<Client> {
        let key = Self::cache_key(cluster);
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let secret_name = cluster.kubeconfig_secret_name();
        let secret = secrets.get(&secret_name).await.map_err(|err| {
            Error::RemoteClusterError(format!(
                "kubeconfig secret {}/{} unavailable: {}",
                namespace, secret_name, err
            ))
        })?;

        let raw = secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| {
                Error::RemoteClusterError(format!(
                    "kubeconfig secret {}/{} has no '{}' key",
                    namespace, secret_name, KUBECONFIG_SECRET_KEY
                ))
            })?;
        let yaml = String::from_utf8(raw.0.clone()).map_err(|_| {
            Error::RemoteClusterError(format!(
                "kubeconfig secret {}/{} is not valid UTF-8",
                namespace, secret_name
            ))
        })?;

        let kubeconfig = Kubeconfig::from_yaml(&yaml)
            .map_err(|err| Error::RemoteClusterError(format!("invalid kubeconfig: {}", err)))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|err| Error::RemoteClusterError(format!("invalid kubeconfig: {}", err)))?;
        let client = Client::try_from(config)?;

        self.clients.write().await.insert(key, client.clone());
        Ok(client)
    }

    /// Start watching the workload cluster's Nodes, once per cluster.
    /// Every touched node is routed back to the health checks it affects.
    pub async fn ensure_node_watch(&self, cluster: &FleetCluster, workload: Client) {
        let key = Self::cache_key(cluster);
        {
            let mut watched = self.watched.lock().await;
            if !watched.insert(key.clone()) {
                return;
            }
        }

        let cluster_name = cluster.name_any();
        let machines = self.machines.clone();
        let health_checks = self.health_checks.clone();
        let trigger = self.trigger.clone();
        let watched = self.watched.clone();

        info!(cluster = %cluster_name, "starting node watch");
        tokio::spawn(async move {
            let nodes: Api<Node> = Api::all(workload);
            let mut stream = watcher(nodes, watcher::Config::default())
                .default_backoff()
                .touched_objects()
                .boxed();

            while let Some(event) = stream.next().await {
                let node = match event {
                    Ok(node) => node,
                    Err(err) => {
                        warn!(cluster = %cluster_name, error = %err, "node watch error");
                        continue;
                    }
                };
                let targets = router::node_to_health_checks(
                    &cluster_name,
                    &node,
                    &machines.state(),
                    &health_checks.state(),
                );
                let mut trigger = trigger.clone();
                for target in targets {
                    if trigger.send(target).await.is_err() {
                        // Controller is shutting down
                        return;
                    }
                }
            }

            // Stream ended (cluster deleted or connection lost for good):
            // allow a later reconciliation to restart the watch.
            warn!(cluster = %cluster_name, "node watch ended");
            watched.lock().await.remove(&key);
        });
    }
}
