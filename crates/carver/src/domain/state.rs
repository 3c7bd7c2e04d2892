//! Cluster state store
//!
//! The concurrently-mutated in-memory model of nodes, their bound pods, and
//! the GPU devices derived from node labels and annotations. Inbound watch
//! events replace a node's entire sub-state atomically, so readers always
//! observe a single generation of updates for any node. A single store-wide
//! lock keeps the implementation simple; node updates are infrequent
//! relative to reads.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::RwLock;

use api_types::resource;
use api_types::resource::QuantityError;
use api_types::PartitioningKind;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;
use tracing::debug;

use crate::domain::device::GpuDevice;
use crate::domain::device::GpuModel;
use crate::domain::device::MigProfileName;

/// Malformed label or resource data observed while rebuilding a node's state.
/// The store rejects the update and keeps the previous generation.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("node {node}: invalid GPU count label {value:?}")]
    InvalidGpuCount { node: String, value: String },

    #[error("node {node}: GPU count is {count} but the product label is missing")]
    MissingGpuModel { node: String, count: u32 },

    #[error("node {node}: invalid status annotation {key}: {value:?}")]
    InvalidStatusAnnotation {
        node: String,
        key: String,
        value: String,
    },

    #[error("pod {namespace}/{pod}: invalid quantity for {resource}: {source}")]
    InvalidResourceQuantity {
        namespace: String,
        pod: String,
        resource: String,
        source: QuantityError,
    },
}

/// The GPU demand a pod declares, distilled from its container resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRequest {
    pub name: String,
    pub namespace: String,
    pub phase: Option<String>,
    /// Requested MIG profile instances by profile name.
    pub mig_profiles: BTreeMap<MigProfileName, u64>,
}

impl PodRequest {
    pub fn from_pod(pod: &Pod) -> Result<Self, StateError> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let phase = pod.status.as_ref().and_then(|s| s.phase.clone());

        let mut mig_profiles = BTreeMap::new();
        if let Some(spec) = &pod.spec {
            for container in &spec.containers {
                let Some(resources) = &container.resources else {
                    continue;
                };
                // Extended resources must declare limits equal to requests;
                // take whichever is present.
                let Some(declared) = resources.limits.as_ref().or(resources.requests.as_ref())
                else {
                    continue;
                };
                for (resource_name, quantity) in declared {
                    let Some(profile) = resource_name.strip_prefix(api_types::RESOURCE_MIG_PREFIX)
                    else {
                        continue;
                    };
                    let count = resource::parse_count(quantity).map_err(|source| {
                        StateError::InvalidResourceQuantity {
                            namespace: namespace.clone(),
                            pod: name.clone(),
                            resource: resource_name.clone(),
                            source,
                        }
                    })?;
                    if count > 0 {
                        *mig_profiles.entry(MigProfileName::from(profile)).or_insert(0) += count;
                    }
                }
            }
        }

        Ok(Self {
            name,
            namespace,
            phase,
            mig_profiles,
        })
    }

    /// Terminated pods hold no devices and contribute no demand.
    pub fn is_terminated(&self) -> bool {
        matches!(self.phase.as_deref(), Some("Succeeded") | Some("Failed"))
    }
}

/// Everything the partitioner needs to know about one node, rebuilt
/// wholesale on every upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub partitioning_kind: PartitioningKind,
    pub gpu_model: Option<GpuModel>,
    pub pods: Vec<PodRequest>,
    pub devices: Vec<GpuDevice>,
}

impl NodeState {
    pub fn from_kube(node: &Node, pods: &[Pod]) -> Result<Self, StateError> {
        let name = node.metadata.name.clone().unwrap_or_default();
        let labels = node.metadata.labels.clone().unwrap_or_default();
        let annotations = node.metadata.annotations.clone().unwrap_or_default();

        let partitioning_kind = labels
            .get(api_types::LABEL_GPU_PARTITIONING)
            .map(|v| PartitioningKind::from_label(v))
            .unwrap_or_default();

        let gpu_count: u32 = match labels.get(api_types::LABEL_NVIDIA_GPU_COUNT) {
            Some(value) => value.parse().map_err(|_| StateError::InvalidGpuCount {
                node: name.clone(),
                value: value.clone(),
            })?,
            None => 0,
        };

        let gpu_model = labels
            .get(api_types::LABEL_NVIDIA_GPU_PRODUCT)
            .map(|v| GpuModel::new(v.clone()));
        if gpu_count > 0 && gpu_model.is_none() {
            return Err(StateError::MissingGpuModel {
                node: name,
                count: gpu_count,
            });
        }

        let mut devices = Vec::with_capacity(gpu_count as usize);
        if let Some(model) = &gpu_model {
            for index in 0..gpu_count {
                let prefix = format!("{}{index}-", api_types::ANNOTATION_STATUS_GPU_PREFIX);
                let mut profiles = BTreeMap::new();
                for (key, value) in &annotations {
                    let Some(profile) = key.strip_prefix(&prefix) else {
                        continue;
                    };
                    let count: u32 =
                        value
                            .parse()
                            .map_err(|_| StateError::InvalidStatusAnnotation {
                                node: name.clone(),
                                key: key.clone(),
                                value: value.clone(),
                            })?;
                    if count > 0 {
                        profiles.insert(MigProfileName::from(profile), count);
                    }
                }
                devices.push(GpuDevice {
                    index,
                    model: model.clone(),
                    profiles,
                });
            }
        }

        let pods = pods
            .iter()
            .map(PodRequest::from_pod)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            labels,
            partitioning_kind,
            gpu_model,
            pods,
            devices,
        })
    }

    /// Multiset of MIG profiles requested by the node's live pods.
    pub fn requested_profiles(&self) -> BTreeMap<MigProfileName, u64> {
        let mut requested = BTreeMap::new();
        for pod in self.pods.iter().filter(|p| !p.is_terminated()) {
            for (profile, count) in &pod.mig_profiles {
                *requested.entry(profile.clone()).or_insert(0) += count;
            }
        }
        requested
    }
}

/// Concurrency-safe index of the cluster's nodes. The only shared mutable
/// structure in the partitioning engine; constructor-injected into every
/// component that needs it.
#[derive(Debug, Default)]
pub struct ClusterState {
    nodes: RwLock<HashMap<String, NodeState>>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the node's metadata, pod list, and derived device view in one
    /// atomic step. Idempotent. On parse failure the stored generation is
    /// left untouched and the error is surfaced to the caller.
    pub fn update_node(&self, node: &Node, pods: &[Pod]) -> Result<(), StateError> {
        // Parse outside the lock; only the swap is serialized.
        let state = NodeState::from_kube(node, pods)?;
        let name = state.name.clone();
        let pod_count = state.pods.len();

        let mut nodes = self.nodes.write().expect("cluster state lock poisoned");
        nodes.insert(name.clone(), state);
        drop(nodes);

        debug!(node = %name, pods = pod_count, "Node state updated");
        Ok(())
    }

    /// Remove a node and all its derived state. Idempotent, absent is fine.
    pub fn delete_node(&self, name: &str) {
        let mut nodes = self.nodes.write().expect("cluster state lock poisoned");
        if nodes.remove(name).is_some() {
            debug!(node = %name, "Node removed from state");
        }
    }

    /// Drop every node not named in `keep`. Used when a watch stream restarts
    /// and delivers a full relist.
    pub fn retain_nodes(&self, keep: &HashSet<String>) {
        let mut nodes = self.nodes.write().expect("cluster state lock poisoned");
        nodes.retain(|name, _| keep.contains(name));
    }

    pub fn get_node(&self, name: &str) -> Option<NodeState> {
        self.nodes
            .read()
            .expect("cluster state lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn get_nodes(&self) -> HashMap<String, NodeState> {
        self.nodes
            .read()
            .expect("cluster state lock poisoned")
            .clone()
    }
}
