//! Shared API type definitions
//!
//! This crate contains the schema types shared across gpu-carver components:
//! the partitioning-kind node label, the well-known labels and annotations the
//! operator reads from nodes, resource-quantity arithmetic, and the
//! ElasticQuota custom resource.

use serde::Deserialize;
use serde::Serialize;

pub mod elastic_quota;
pub mod resource;

pub use elastic_quota::ElasticQuota;
pub use elastic_quota::ElasticQuotaBuilder;
pub use elastic_quota::ElasticQuotaSpec;
pub use elastic_quota::ElasticQuotaStatus;

/// Domain prefix for gpu-carver labels and annotations.
pub const GPU_CARVER_DOMAIN: &str = "gpu-carver.io";

/// Node label selecting the partitioning strategy for its GPUs.
pub const LABEL_GPU_PARTITIONING: &str = "gpu-carver.io/gpu-partitioning";

/// Node label exposing the number of physical GPUs (GPU feature discovery).
pub const LABEL_NVIDIA_GPU_COUNT: &str = "nvidia.com/gpu.count";

/// Node label exposing the GPU product name (GPU feature discovery).
pub const LABEL_NVIDIA_GPU_PRODUCT: &str = "nvidia.com/gpu.product";

/// Prefix of the node annotations reporting the profiles currently carved out
/// of each GPU, as `gpu-carver.io/status-gpu-<index>-<profile>: <count>`.
pub const ANNOTATION_STATUS_GPU_PREFIX: &str = "gpu-carver.io/status-gpu-";

/// Prefix of the extended resource names requesting a MIG profile,
/// e.g. `nvidia.com/mig-1g.5gb`.
pub const RESOURCE_MIG_PREFIX: &str = "nvidia.com/mig-";

/// Extended resource name for generic GPU memory requests, constrained by
/// ElasticQuota rather than by a specific MIG profile.
pub const RESOURCE_GPU_MEMORY: &str = "gpu-carver.io/gpu-memory";

/// GPU sharing strategy assigned to a node through [`LABEL_GPU_PARTITIONING`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PartitioningKind {
    /// No sharing: the node's GPUs are scheduled whole.
    #[default]
    None,
    /// Multi-Instance GPU: hardware partitioning into isolated profiles.
    Mig,
    /// Multi-Process Service: software time-slicing, no hardware layout.
    Mps,
}

impl PartitioningKind {
    /// Parse the value of the partitioning label. Unrecognized values map to
    /// `None` so a single mislabeled node cannot fail cluster-wide snapshots.
    pub fn from_label(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "mig" => Self::Mig,
            "mps" => Self::Mps,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for PartitioningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Mig => "mig",
            Self::Mps => "mps",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioning_kind_from_label() {
        assert_eq!(PartitioningKind::from_label("mig"), PartitioningKind::Mig);
        assert_eq!(PartitioningKind::from_label("MIG"), PartitioningKind::Mig);
        assert_eq!(PartitioningKind::from_label("mps"), PartitioningKind::Mps);
        assert_eq!(PartitioningKind::from_label("MPS"), PartitioningKind::Mps);
        assert_eq!(
            PartitioningKind::from_label("time-slicing"),
            PartitioningKind::None
        );
        assert_eq!(PartitioningKind::from_label(""), PartitioningKind::None);
    }

    #[test]
    fn partitioning_kind_display() {
        assert_eq!(PartitioningKind::Mig.to_string(), "mig");
        assert_eq!(PartitioningKind::Mps.to_string(), "mps");
        assert_eq!(PartitioningKind::None.to_string(), "none");
    }
}
