//! ElasticQuota custom resource
//!
//! Namespace-scoped elastic quota: `min` is the guaranteed amount per
//! resource, `max` the hard ceiling, and `status.used` the observed usage.
//! The partitioner consumes these objects read-only; accounting is done by a
//! separate controller.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::resource::{self, QuantityError, ResourceList};

/// ElasticQuotaSpec defines the min and max for the quota.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gpu-carver.io",
    version = "v1alpha1",
    kind = "ElasticQuota",
    namespaced,
    status = "ElasticQuotaStatus",
    shortname = "eq"
)]
pub struct ElasticQuotaSpec {
    /// Guaranteed amount for each named resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<ResourceList>,

    /// Upper bound for each named resource, counted over successfully
    /// scheduled pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<ResourceList>,
}

/// Observed usage for the quota's namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ElasticQuotaStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<ResourceList>,
}

impl ElasticQuota {
    pub fn builder(namespace: &str, name: &str) -> ElasticQuotaBuilder {
        ElasticQuotaBuilder {
            namespace: namespace.to_string(),
            name: name.to_string(),
            spec: ElasticQuotaSpec::default(),
        }
    }

    /// True when `request`, stacked on the observed usage, stays within
    /// `spec.max`. A quota without `max` never constrains.
    pub fn has_capacity_for(&self, request: &ResourceList) -> Result<bool, QuantityError> {
        let Some(max) = &self.spec.max else {
            return Ok(true);
        };
        let mut projected = self
            .status
            .as_ref()
            .and_then(|s| s.used.clone())
            .unwrap_or_default();
        resource::add(&mut projected, request)?;
        resource::fits_within(&projected, max)
    }
}

/// Builder for ElasticQuota objects, mainly used by tests and fixtures.
pub struct ElasticQuotaBuilder {
    namespace: String,
    name: String,
    spec: ElasticQuotaSpec,
}

impl ElasticQuotaBuilder {
    pub fn with_min(mut self, min: ResourceList) -> Self {
        self.spec.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: ResourceList) -> Self {
        self.spec.max = Some(max);
        self
    }

    pub fn build(self) -> ElasticQuota {
        let mut quota = ElasticQuota::new(&self.name, self.spec);
        quota.metadata.namespace = Some(self.namespace);
        quota
    }
}
