//! Node watcher
//!
//! Feeds the cluster state store from the Kubernetes API: every applied Node
//! triggers a fresh listing of the pods bound to it, and the pair replaces
//! that node's stored state atomically. Deleted nodes are dropped from the
//! store; a watch restart relists and prunes nodes that disappeared while
//! the stream was down.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::runtime::watcher::watcher;
use kube::runtime::watcher::Config;
use kube::runtime::watcher::Event;
use kube::Api;
use kube::Client;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::state::ClusterState;
use crate::infrastructure::k8s::types::KubernetesError;
use crate::infrastructure::kube_client;

pub struct NodeWatcher {
    kubeconfig: Option<PathBuf>,
    state: Arc<ClusterState>,
}

impl NodeWatcher {
    pub fn new(kubeconfig: Option<PathBuf>, state: Arc<ClusterState>) -> Self {
        Self { kubeconfig, state }
    }

    /// Watch nodes until cancelled, restarting the stream with a short
    /// backoff when it fails.
    #[tracing::instrument(skip(self, cancellation_token))]
    pub async fn run(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting node watcher");
        let client = kube_client::init_kube_client(self.kubeconfig.clone()).await?;
        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Node watcher shutdown requested");
                    break;
                }
                result = self.watch_nodes(&client) => {
                    match result {
                        Ok(()) => {
                            warn!("Node watch stream ended unexpectedly, restarting...");
                        }
                        Err(e) => {
                            error!("Node watch failed: {e:?}");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn watch_nodes(&self, client: &Client) -> Result<(), Report<KubernetesError>> {
        let api: Api<Node> = Api::all(client.clone());
        let mut stream = watcher(api, Config::default()).boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Applied(node)) => {
                    self.handle_node_applied(client, node).await;
                }
                Ok(Event::Deleted(node)) => {
                    let name = node.metadata.name.unwrap_or_default();
                    self.state.delete_node(&name);
                    info!(node = %name, "Node deleted");
                }
                Ok(Event::Restarted(nodes)) => {
                    let keep: HashSet<String> = nodes
                        .iter()
                        .filter_map(|n| n.metadata.name.clone())
                        .collect();
                    self.state.retain_nodes(&keep);
                    for node in nodes {
                        self.handle_node_applied(client, node).await;
                    }
                }
                Err(e) => {
                    return Err(Report::new(KubernetesError::WatchFailed {
                        message: format!("Watch stream error: {e}"),
                    }));
                }
            }
        }

        Ok(())
    }

    /// Replace the node's stored state from the applied object plus a fresh
    /// pod listing. A malformed node keeps its previous generation.
    async fn handle_node_applied(&self, client: &Client, node: Node) {
        let Some(name) = node.metadata.name.clone() else {
            return;
        };
        match self.list_node_pods(client, &name).await {
            Ok(pods) => {
                if let Err(e) = self.state.update_node(&node, &pods) {
                    error!(node = %name, "Rejected node update: {e}");
                }
            }
            Err(e) => {
                error!(node = %name, "Failed to list pods for node: {e:?}");
            }
        }
    }

    async fn list_node_pods(
        &self,
        client: &Client,
        node_name: &str,
    ) -> Result<Vec<Pod>, Report<KubernetesError>> {
        let api: Api<Pod> = Api::all(client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
        let pods = api.list(&params).await.map_err(|e| {
            Report::new(KubernetesError::PodListFailed {
                node: node_name.to_string(),
                message: e.to_string(),
            })
        })?;
        Ok(pods.items)
    }
}
