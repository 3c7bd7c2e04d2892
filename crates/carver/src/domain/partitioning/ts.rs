//! Time-slicing partitioner
//!
//! MPS shares whole GPUs between processes; it is a scheduling policy, not a
//! hardware layout. There is never a structural change to apply, so the
//! desired partitioning is always empty and the reconciler issues no device
//! operations for MPS nodes.

use crate::domain::snapshot::NodeSnapshot;

use super::NodePartitioning;
use super::Partitioner;

pub struct TimeSlicingPartitioner;

impl Partitioner for TimeSlicingPartitioner {
    fn get_partitioning(&self, _node: &NodeSnapshot) -> NodePartitioning {
        NodePartitioning::default()
    }
}

#[cfg(test)]
mod tests {
    use api_types::PartitioningKind;

    use super::*;
    use crate::domain::snapshot::NodeSnapshot;
    use crate::testutil::PodBuilder;

    #[test]
    fn always_returns_no_structural_change() {
        let node = NodeSnapshot {
            name: "node-1".to_string(),
            kind: PartitioningKind::Mps,
            devices: vec![],
            pods: vec![crate::domain::state::PodRequest::from_pod(
                &PodBuilder::new("pod-1", "default")
                    .with_mig_request("1g.5gb", 2)
                    .get(),
            )
            .unwrap()],
        };

        let desired = TimeSlicingPartitioner.get_partitioning(&node);
        assert!(desired.is_empty());
        assert!(desired.gpus.is_empty());
    }
}
