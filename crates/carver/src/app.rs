//! Partitioning cycle
//!
//! The periodic loop tying the engine together: take a snapshot per
//! partitioning kind, compute each node's desired layout, and apply it
//! through the reconciler. The loop never touches the live store directly;
//! concurrent node updates land in the next cycle's snapshot.

use std::sync::Arc;
use std::time::Duration;

use api_types::PartitioningKind;
use tokio::select;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::device::MigCapabilityRegistry;
use crate::domain::partitioning;
use crate::domain::snapshot::SnapshotTaker;
use crate::domain::state::ClusterState;
use crate::infrastructure::device_client::MigDeviceClient;
use crate::infrastructure::reconciler::DesiredStateReconciler;

pub struct App<C> {
    state: Arc<ClusterState>,
    capabilities: Arc<MigCapabilityRegistry>,
    reconciler: DesiredStateReconciler<C>,
    interval: Duration,
}

impl<C: MigDeviceClient> App<C> {
    pub fn new(
        state: Arc<ClusterState>,
        capabilities: Arc<MigCapabilityRegistry>,
        client: Arc<C>,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            capabilities,
            reconciler: DesiredStateReconciler::new(client),
            interval,
        }
    }

    /// Run partitioning cycles until cancelled.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Partitioning loop shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    for kind in [PartitioningKind::Mig, PartitioningKind::Mps] {
                        if cancellation_token.is_cancelled() {
                            break;
                        }
                        self.run_cycle(kind, &cancellation_token).await;
                    }
                }
            }
        }
    }

    /// One compute-on-snapshot pass for a single partitioning kind. Failures
    /// are logged and retried by the next cycle, never propagated.
    pub(crate) async fn run_cycle(&self, kind: PartitioningKind, cancellation_token: &CancellationToken) {
        let taker = SnapshotTaker::new(kind, self.capabilities.clone());
        let snapshot = match taker.take_snapshot(&self.state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(kind = %kind, "Snapshot failed: {e}");
                return;
            }
        };
        let Some(partitioner) = partitioning::partitioner(kind) else {
            return;
        };

        for (name, node) in snapshot.nodes() {
            if cancellation_token.is_cancelled() {
                break;
            }
            let desired = partitioner.get_partitioning(node);
            debug!(
                node = %name,
                kind = %kind,
                desired = ?desired.profile_counts(),
                "Computed desired partitioning"
            );
            match self.reconciler.apply(node, &desired, cancellation_token).await {
                Ok(report) if report.failures.is_empty() => {
                    if report.created + report.deleted > 0 {
                        info!(
                            node = %name,
                            created = report.created,
                            deleted = report.deleted,
                            "Applied desired partitioning"
                        );
                    }
                }
                Ok(report) => {
                    warn!(
                        node = %name,
                        created = report.created,
                        deleted = report.deleted,
                        failures = report.failures.len(),
                        "Desired partitioning applied with per-device failures"
                    );
                }
                Err(e) => {
                    error!(node = %name, "Failed to apply desired partitioning: {e}");
                }
            }
        }
    }
}
