//! Point-in-time snapshots of the cluster state
//!
//! The partitioning algorithm never reads the live store: it works on an
//! isolated, deep-copied view filtered to the nodes of one partitioning
//! kind, taken at a single instant. Later store mutations are invisible
//! through the snapshot; the next cycle simply takes a fresh one.

use std::collections::BTreeMap;
use std::sync::Arc;

use api_types::PartitioningKind;
use thiserror::Error;

use crate::domain::device::GpuModel;
use crate::domain::device::MigCapability;
use crate::domain::device::MigCapabilityRegistry;
use crate::domain::device::MigProfileName;
use crate::domain::state::ClusterState;
use crate::domain::state::PodRequest;

/// A snapshot cannot be taken over malformed node data. Partial snapshots
/// are not allowed: one bad node aborts the whole operation so the
/// partitioning cycle never acts on a silently incomplete view.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("node {node}: unknown GPU model {model}, no MIG capability entry")]
    UnknownGpuModel { node: String, model: GpuModel },
}

/// One GPU as seen by the partitioner: current occupancy plus, for MIG
/// snapshots, the resolved capability of its model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub index: u32,
    pub model: GpuModel,
    pub capability: Option<MigCapability>,
    pub profiles: BTreeMap<MigProfileName, u32>,
}

/// Read-only view of one node, owned by the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub name: String,
    pub kind: PartitioningKind,
    pub devices: Vec<DeviceSnapshot>,
    pub pods: Vec<PodRequest>,
}

impl NodeSnapshot {
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

/// Immutable, independently-owned copy of the nodes of one partitioning
/// kind. Keyed by node name for deterministic enumeration.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    kind: PartitioningKind,
    nodes: BTreeMap<String, NodeSnapshot>,
}

impl ClusterSnapshot {
    pub fn kind(&self) -> PartitioningKind {
        self.kind
    }

    pub fn nodes(&self) -> &BTreeMap<String, NodeSnapshot> {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Produces [`ClusterSnapshot`]s for one partitioning kind.
pub struct SnapshotTaker {
    kind: PartitioningKind,
    capabilities: Arc<MigCapabilityRegistry>,
}

impl SnapshotTaker {
    pub fn new(kind: PartitioningKind, capabilities: Arc<MigCapabilityRegistry>) -> Self {
        Self { kind, capabilities }
    }

    /// Deep-copy the nodes whose partitioning label matches this taker's
    /// kind. For MIG snapshots every device's model must resolve to a
    /// capability entry; an unknown model fails the whole snapshot.
    pub fn take_snapshot(&self, state: &ClusterState) -> Result<ClusterSnapshot, SnapshotError> {
        let mut nodes = BTreeMap::new();

        for (name, node) in state.get_nodes() {
            if node.partitioning_kind != self.kind {
                continue;
            }

            let mut devices = Vec::with_capacity(node.devices.len());
            for device in &node.devices {
                let capability = match self.kind {
                    PartitioningKind::Mig => Some(
                        self.capabilities
                            .get(&device.model)
                            .cloned()
                            .ok_or_else(|| SnapshotError::UnknownGpuModel {
                                node: name.clone(),
                                model: device.model.clone(),
                            })?,
                    ),
                    _ => None,
                };
                devices.push(DeviceSnapshot {
                    index: device.index,
                    model: device.model.clone(),
                    capability,
                    profiles: device.profiles.clone(),
                });
            }

            nodes.insert(
                name.clone(),
                NodeSnapshot {
                    name,
                    kind: self.kind,
                    devices,
                    pods: node.pods.clone(),
                },
            );
        }

        Ok(ClusterSnapshot {
            kind: self.kind,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::testutil::NodeBuilder;
    use crate::testutil::PodBuilder;

    fn registry() -> Arc<MigCapabilityRegistry> {
        Arc::new(MigCapabilityRegistry::new())
    }

    #[test]
    fn empty_state_yields_empty_snapshot() {
        let state = ClusterState::new();
        let taker = SnapshotTaker::new(PartitioningKind::Mig, registry());

        let snapshot = taker.take_snapshot(&state).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.kind(), PartitioningKind::Mig);
    }

    #[test]
    fn snapshot_filters_by_partitioning_kind() {
        let state = ClusterState::new();
        state
            .update_node(&NodeBuilder::new("node-1").get(), &[])
            .unwrap();
        state
            .update_node(
                &NodeBuilder::new("node-2")
                    .with_label(api_types::LABEL_GPU_PARTITIONING, "mig")
                    .with_label(api_types::LABEL_NVIDIA_GPU_COUNT, "1")
                    .with_label(api_types::LABEL_NVIDIA_GPU_PRODUCT, "NVIDIA-A100-SXM4-40GB")
                    .get(),
                &[],
            )
            .unwrap();
        state
            .update_node(
                &NodeBuilder::new("node-3")
                    .with_label(api_types::LABEL_GPU_PARTITIONING, "mps")
                    .with_label(api_types::LABEL_NVIDIA_GPU_COUNT, "1")
                    .with_label(api_types::LABEL_NVIDIA_GPU_PRODUCT, "NVIDIA-A100-SXM4-40GB")
                    .get(),
                &[],
            )
            .unwrap();

        let mig = SnapshotTaker::new(PartitioningKind::Mig, registry())
            .take_snapshot(&state)
            .unwrap();
        let names: BTreeSet<&str> = mig.nodes().keys().map(String::as_str).collect();
        assert_eq!(names, BTreeSet::from(["node-2"]));

        let mps = SnapshotTaker::new(PartitioningKind::Mps, registry())
            .take_snapshot(&state)
            .unwrap();
        let names: BTreeSet<&str> = mps.nodes().keys().map(String::as_str).collect();
        assert_eq!(names, BTreeSet::from(["node-3"]));
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutations() {
        let state = ClusterState::new();
        let node = NodeBuilder::new("node-1")
            .with_label(api_types::LABEL_GPU_PARTITIONING, "mig")
            .with_label(api_types::LABEL_NVIDIA_GPU_COUNT, "1")
            .with_label(api_types::LABEL_NVIDIA_GPU_PRODUCT, "NVIDIA-A100-SXM4-40GB")
            .get();
        let pods = vec![PodBuilder::new("pod-1", "default")
            .with_mig_request("1g.5gb", 2)
            .get()];
        state.update_node(&node, &pods).unwrap();

        let taker = SnapshotTaker::new(PartitioningKind::Mig, registry());
        let snapshot = taker.take_snapshot(&state).unwrap();

        // Mutate the store after the snapshot: new pod list, then deletion.
        state.update_node(&node, &[]).unwrap();
        state.delete_node("node-1");

        let view = snapshot.nodes().get("node-1").unwrap();
        assert_eq!(view.pods.len(), 1);
        assert_eq!(
            view.requested_profiles()
                .get(&MigProfileName::from("1g.5gb")),
            Some(&2)
        );
    }

    #[test]
    fn unknown_gpu_model_aborts_the_whole_snapshot() {
        let state = ClusterState::new();
        state
            .update_node(
                &NodeBuilder::new("node-1")
                    .with_label(api_types::LABEL_GPU_PARTITIONING, "mig")
                    .with_label(api_types::LABEL_NVIDIA_GPU_COUNT, "1")
                    .with_label(api_types::LABEL_NVIDIA_GPU_PRODUCT, "NVIDIA-A100-SXM4-40GB")
                    .get(),
                &[],
            )
            .unwrap();
        state
            .update_node(
                &NodeBuilder::new("node-2")
                    .with_label(api_types::LABEL_GPU_PARTITIONING, "mig")
                    .with_label(api_types::LABEL_NVIDIA_GPU_COUNT, "1")
                    .with_label(api_types::LABEL_NVIDIA_GPU_PRODUCT, "GeForce-GT-710")
                    .get(),
                &[],
            )
            .unwrap();

        let taker = SnapshotTaker::new(PartitioningKind::Mig, registry());
        let err = taker.take_snapshot(&state).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownGpuModel { .. }));
    }

    #[test]
    fn mps_snapshot_does_not_require_capability_entries() {
        let state = ClusterState::new();
        state
            .update_node(
                &NodeBuilder::new("node-1")
                    .with_label(api_types::LABEL_GPU_PARTITIONING, "mps")
                    .with_label(api_types::LABEL_NVIDIA_GPU_COUNT, "1")
                    .with_label(api_types::LABEL_NVIDIA_GPU_PRODUCT, "GeForce-GT-710")
                    .get(),
                &[],
            )
            .unwrap();

        let taker = SnapshotTaker::new(PartitioningKind::Mps, registry());
        let snapshot = taker.take_snapshot(&state).unwrap();
        let view = snapshot.nodes().get("node-1").unwrap();
        assert_eq!(view.devices.len(), 1);
        assert!(view.devices[0].capability.is_none());
    }
}
