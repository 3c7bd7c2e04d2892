//! Desired-state reconciler
//!
//! Diffs a computed [`NodePartitioning`] against the profiles currently
//! carved on each GPU and issues create/delete operations through the device
//! client. Operations go out per device, so a failure on one GPU never
//! blocks its siblings; there is no internal retry, the next partitioning
//! cycle re-applies whatever is still missing.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use crate::domain::device::MigDeviceResource;
use crate::domain::device::MigProfileName;
use crate::domain::device::MigProfileSpec;
use crate::domain::partitioning::NodePartitioning;
use crate::domain::snapshot::NodeSnapshot;
use crate::infrastructure::device_client::DeviceClientError;
use crate::infrastructure::device_client::MigDeviceClient;

/// Outcome of one apply pass over a node.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub created: usize,
    pub deleted: usize,
    /// Per-GPU failures; the affected GPU was skipped, siblings proceeded.
    pub failures: Vec<(u32, DeviceClientError)>,
    /// Set when cancellation stopped the pass before it finished.
    pub cancelled: bool,
}

pub struct DesiredStateReconciler<C> {
    client: Arc<C>,
}

impl<C: MigDeviceClient> DesiredStateReconciler<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Drive the carved profiles of `node`'s GPUs toward `desired`.
    ///
    /// Only fails outright when the current devices cannot be listed;
    /// per-GPU create/delete failures are collected in the report.
    pub async fn apply(
        &self,
        node: &NodeSnapshot,
        desired: &NodePartitioning,
        cancellation_token: &CancellationToken,
    ) -> Result<ApplyReport, DeviceClientError> {
        let mut report = ApplyReport::default();
        if desired.gpus.is_empty() {
            // No structural change requested (time-slicing, empty node).
            return Ok(report);
        }

        let devices = self.client.list_devices().await?;
        let mut current_by_gpu: BTreeMap<u32, Vec<MigDeviceResource>> = BTreeMap::new();
        for device in devices {
            current_by_gpu.entry(device.gpu_index).or_default().push(device);
        }

        'gpus: for gpu in &desired.gpus {
            let current = current_by_gpu.remove(&gpu.gpu_index).unwrap_or_default();
            let mut current_by_profile: BTreeMap<MigProfileName, Vec<MigDeviceResource>> =
                BTreeMap::new();
            for device in current {
                current_by_profile
                    .entry(device.profile.clone())
                    .or_default()
                    .push(device);
            }

            let profiles: BTreeSet<MigProfileName> = gpu
                .profiles
                .keys()
                .chain(current_by_profile.keys())
                .cloned()
                .collect();

            for profile in profiles {
                let want = gpu.profiles.get(&profile).copied().unwrap_or(0) as usize;
                let have = current_by_profile.remove(&profile).unwrap_or_default();

                for _ in have.len()..want {
                    if cancellation_token.is_cancelled() {
                        report.cancelled = true;
                        break 'gpus;
                    }
                    let spec = MigProfileSpec {
                        gpu_index: gpu.gpu_index,
                        profile: profile.clone(),
                    };
                    match self.client.create_profile(&spec).await {
                        Ok(resource) => {
                            report.created += 1;
                            debug!(
                                node = %node.name,
                                gpu_index = gpu.gpu_index,
                                profile = %profile,
                                device_id = %resource.device_id,
                                "Created MIG profile"
                            );
                        }
                        Err(e) => {
                            error!(
                                node = %node.name,
                                gpu_index = gpu.gpu_index,
                                profile = %profile,
                                "Failed to create MIG profile: {e}"
                            );
                            report.failures.push((gpu.gpu_index, e));
                            continue 'gpus;
                        }
                    }
                }

                for resource in have.iter().skip(want) {
                    if cancellation_token.is_cancelled() {
                        report.cancelled = true;
                        break 'gpus;
                    }
                    match self.client.delete_profile(resource).await {
                        Ok(()) => {
                            report.deleted += 1;
                            debug!(
                                node = %node.name,
                                gpu_index = gpu.gpu_index,
                                profile = %profile,
                                device_id = %resource.device_id,
                                "Deleted MIG profile"
                            );
                        }
                        Err(e) if e.is_not_found() => {
                            // Already gone, nothing left to converge.
                            debug!(
                                node = %node.name,
                                device_id = %resource.device_id,
                                "MIG profile already deleted"
                            );
                        }
                        Err(e) => {
                            error!(
                                node = %node.name,
                                gpu_index = gpu.gpu_index,
                                profile = %profile,
                                "Failed to delete MIG profile: {e}"
                            );
                            report.failures.push((gpu.gpu_index, e));
                            continue 'gpus;
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use api_types::PartitioningKind;

    use super::*;
    use crate::domain::partitioning::GpuPartitioning;
    use crate::infrastructure::device_client::fake::FakeMigClient;

    fn node(name: &str) -> NodeSnapshot {
        NodeSnapshot {
            name: name.to_string(),
            kind: PartitioningKind::Mig,
            devices: vec![],
            pods: vec![],
        }
    }

    fn desired(gpus: &[(u32, &[(&str, u32)])]) -> NodePartitioning {
        NodePartitioning {
            gpus: gpus
                .iter()
                .map(|(index, profiles)| GpuPartitioning {
                    gpu_index: *index,
                    profiles: profiles
                        .iter()
                        .map(|(name, count)| (MigProfileName::from(*name), *count))
                        .collect(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn deficit_creates_against_a_clean_device() {
        let client = Arc::new(FakeMigClient::new());
        let reconciler = DesiredStateReconciler::new(client.clone());

        let report = reconciler
            .apply(
                &node("node-1"),
                &desired(&[(0, &[("1g.5gb", 2)])]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.deleted, 0);
        assert!(report.failures.is_empty());
        let specs = client.created_specs();
        assert_eq!(specs.len(), 2);
        assert!(specs
            .iter()
            .all(|s| s.gpu_index == 0 && s.profile == MigProfileName::from("1g.5gb")));
    }

    #[tokio::test]
    async fn empty_desired_deletes_all_carved_profiles() {
        let client = Arc::new(FakeMigClient::with_devices(vec![
            FakeMigClient::device(0, "1g.5gb", "gi-0"),
            FakeMigClient::device(0, "1g.5gb", "gi-1"),
            FakeMigClient::device(0, "3g.20gb", "gi-2"),
        ]));
        let reconciler = DesiredStateReconciler::new(client.clone());

        // The partitioner lists the device with no profiles when the node's
        // pod list is empty.
        let report = reconciler
            .apply(
                &node("node-1"),
                &desired(&[(0, &[])]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.deleted, 3);
        assert_eq!(client.deleted_resources().len(), 3);
        assert!(client.list_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn surplus_and_deficit_reconcile_in_one_pass() {
        let client = Arc::new(FakeMigClient::with_devices(vec![
            FakeMigClient::device(0, "3g.20gb", "gi-0"),
            FakeMigClient::device(0, "3g.20gb", "gi-1"),
        ]));
        let reconciler = DesiredStateReconciler::new(client.clone());

        let report = reconciler
            .apply(
                &node("node-1"),
                &desired(&[(0, &[("3g.20gb", 1), ("1g.5gb", 2)])]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.deleted, 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn failure_on_one_gpu_does_not_block_siblings() {
        let client = Arc::new(FakeMigClient::new().failing_creates_on_gpu(0));
        let reconciler = DesiredStateReconciler::new(client.clone());

        let report = reconciler
            .apply(
                &node("node-1"),
                &desired(&[(0, &[("1g.5gb", 1)]), (1, &[("1g.5gb", 1)])]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 0);
        // The sibling GPU still got its profile.
        assert_eq!(report.created, 1);
        assert_eq!(client.created_specs()[0].gpu_index, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_before_further_device_calls() {
        let client = Arc::new(FakeMigClient::new());
        let reconciler = DesiredStateReconciler::new(client.clone());

        let token = CancellationToken::new();
        token.cancel();

        let report = reconciler
            .apply(
                &node("node-1"),
                &desired(&[(0, &[("1g.5gb", 2)])]),
                &token,
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.created, 0);
        assert!(client.created_specs().is_empty());
    }

    #[tokio::test]
    async fn no_desired_gpus_skips_the_device_client_entirely() {
        let client = Arc::new(FakeMigClient::new());
        let reconciler = DesiredStateReconciler::new(client.clone());

        let report = reconciler
            .apply(
                &node("node-1"),
                &NodePartitioning::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.created + report.deleted, 0);
        assert_eq!(client.num_calls_list(), 0);
    }
}
