//! MIG partitioner
//!
//! Greedy packing of the node's requested profiles onto its GPUs. Largest
//! profiles are placed first to limit fragmentation; ties break on profile
//! name so the result is deterministic for a given snapshot. A request that
//! fits no device is dropped, not an error: the pod stays pending and the
//! next cycle retries against whatever capacity has freed up.

use std::collections::BTreeMap;

use crate::domain::device::MigCapability;
use crate::domain::device::MigProfileName;
use crate::domain::snapshot::NodeSnapshot;

use super::GpuPartitioning;
use super::NodePartitioning;
use super::Partitioner;

pub struct MigPartitioner;

struct Placement<'a> {
    gpu_index: u32,
    capability: &'a MigCapability,
    used_slices: u32,
    counts: BTreeMap<MigProfileName, u32>,
}

impl Placement<'_> {
    fn try_place(&mut self, profile: &MigProfileName) -> bool {
        if !self.capability.supports(profile) {
            return false;
        }
        let count = self.counts.get(profile).copied().unwrap_or(0);
        if count >= self.capability.max_count(profile) {
            return false;
        }
        if self.used_slices + profile.slices() > self.capability.total_slices {
            return false;
        }
        self.used_slices += profile.slices();
        self.counts.insert(profile.clone(), count + 1);
        true
    }
}

impl Partitioner for MigPartitioner {
    fn get_partitioning(&self, node: &NodeSnapshot) -> NodePartitioning {
        let mut placements: Vec<Placement<'_>> = node
            .devices
            .iter()
            .filter_map(|device| {
                device.capability.as_ref().map(|capability| Placement {
                    gpu_index: device.index,
                    capability,
                    used_slices: 0,
                    counts: BTreeMap::new(),
                })
            })
            .collect();
        placements.sort_by_key(|p| p.gpu_index);

        // Each instance occupies at least one slice, so the node-wide slice
        // budget bounds how many placements a single profile can ever need.
        let node_slices: u64 = placements
            .iter()
            .map(|p| u64::from(p.capability.total_slices))
            .sum();

        let demand = node.requested_profiles();
        let mut requests: Vec<&MigProfileName> = Vec::new();
        for (profile, count) in &demand {
            for _ in 0..(*count).min(node_slices) {
                requests.push(profile);
            }
        }
        // Largest first; names break ties.
        requests.sort_by(|a, b| b.slices().cmp(&a.slices()).then_with(|| a.cmp(b)));

        for profile in requests {
            for placement in placements.iter_mut() {
                if placement.try_place(profile) {
                    break;
                }
            }
        }

        NodePartitioning {
            gpus: placements
                .into_iter()
                .map(|p| GpuPartitioning {
                    gpu_index: p.gpu_index,
                    profiles: p.counts,
                })
                .collect(),
        }
    }
}
