//! MIG device client
//!
//! Capability set of the actuator that enumerates, creates, and deletes
//! physical MIG devices. The driver-level implementation lives outside this
//! operator; the shipped binary wires [`LoggingMigClient`], which reports
//! planned operations instead of touching hardware, and tests use an
//! in-memory fake.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::domain::device::MigDeviceResource;
use crate::domain::device::MigProfileSpec;

#[derive(Debug, Error)]
pub enum DeviceClientError {
    #[error("device resource not found")]
    NotFound,

    #[error("device operation failed: {message}")]
    OperationFailed { message: String },
}

impl DeviceClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[async_trait]
pub trait MigDeviceClient: Send + Sync {
    /// Enumerate the MIG devices currently carved across the managed GPUs.
    async fn list_devices(&self) -> Result<Vec<MigDeviceResource>, DeviceClientError>;

    /// Carve a new profile instance on the GPU named by `spec`.
    async fn create_profile(
        &self,
        spec: &MigProfileSpec,
    ) -> Result<MigDeviceResource, DeviceClientError>;

    /// Delete a carved profile instance.
    async fn delete_profile(&self, resource: &MigDeviceResource) -> Result<(), DeviceClientError>;
}

/// Reports planned operations through the log without touching the driver.
/// Stands behind the same trait as a driver-backed client.
pub struct LoggingMigClient;

#[async_trait]
impl MigDeviceClient for LoggingMigClient {
    async fn list_devices(&self) -> Result<Vec<MigDeviceResource>, DeviceClientError> {
        Ok(Vec::new())
    }

    async fn create_profile(
        &self,
        spec: &MigProfileSpec,
    ) -> Result<MigDeviceResource, DeviceClientError> {
        info!(
            gpu_index = spec.gpu_index,
            profile = %spec.profile,
            "Planned MIG profile creation"
        );
        Ok(MigDeviceResource {
            gpu_index: spec.gpu_index,
            profile: spec.profile.clone(),
            device_id: format!("planned-gpu{}-{}", spec.gpu_index, spec.profile),
        })
    }

    async fn delete_profile(&self, resource: &MigDeviceResource) -> Result<(), DeviceClientError> {
        info!(
            gpu_index = resource.gpu_index,
            profile = %resource.profile,
            device_id = %resource.device_id,
            "Planned MIG profile deletion"
        );
        Ok(())
    }
}
