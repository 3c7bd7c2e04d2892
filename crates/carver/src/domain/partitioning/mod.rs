//! Partitioning decision logic
//!
//! One partitioner per [`PartitioningKind`], behind a common trait. The
//! variant set is fixed and small, so dispatch is a closed match rather than
//! a plugin registry. Partitioners are stateless pure functions over a
//! [`NodeSnapshot`]: same input, same output, no side effects.

use std::collections::BTreeMap;

use api_types::PartitioningKind;

use crate::domain::device::MigProfileName;
use crate::domain::snapshot::NodeSnapshot;

pub mod mig;
pub mod ts;

pub use mig::MigPartitioner;
pub use ts::TimeSlicingPartitioner;

/// Target layout for one GPU: desired instance count per profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuPartitioning {
    pub gpu_index: u32,
    pub profiles: BTreeMap<MigProfileName, u32>,
}

/// Target layout for a whole node, the sole output of a partitioner.
/// An empty value means "no structural change needed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePartitioning {
    pub gpus: Vec<GpuPartitioning>,
}

impl NodePartitioning {
    /// Aggregate desired counts across all GPUs of the node.
    pub fn profile_counts(&self) -> BTreeMap<MigProfileName, u64> {
        let mut counts = BTreeMap::new();
        for gpu in &self.gpus {
            for (profile, count) in &gpu.profiles {
                *counts.entry(profile.clone()).or_insert(0) += u64::from(*count);
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.gpus.iter().all(|gpu| gpu.profiles.is_empty())
    }
}

pub trait Partitioner: Send + Sync {
    /// Compute the desired layout for one node from its current devices and
    /// its pods' resource requests.
    fn get_partitioning(&self, node: &NodeSnapshot) -> NodePartitioning;
}

/// Closed dispatch over the fixed kind set. `None` nodes have no partitioner.
pub fn partitioner(kind: PartitioningKind) -> Option<&'static dyn Partitioner> {
    match kind {
        PartitioningKind::Mig => Some(&MigPartitioner),
        PartitioningKind::Mps => Some(&TimeSlicingPartitioner),
        PartitioningKind::None => None,
    }
}
