//! Test fixtures for Kubernetes objects.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub(crate) struct NodeBuilder {
    name: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl NodeBuilder {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub(crate) fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn get(self) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(self.name),
                labels: (!self.labels.is_empty()).then_some(self.labels),
                annotations: (!self.annotations.is_empty()).then_some(self.annotations),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

pub(crate) struct PodBuilder {
    name: String,
    namespace: String,
    phase: Option<String>,
    mig_requests: BTreeMap<String, u64>,
}

impl PodBuilder {
    pub(crate) fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            phase: None,
            mig_requests: BTreeMap::new(),
        }
    }

    pub(crate) fn with_mig_request(mut self, profile: &str, count: u64) -> Self {
        self.mig_requests.insert(
            format!("{}{profile}", api_types::RESOURCE_MIG_PREFIX),
            count,
        );
        self
    }

    pub(crate) fn with_phase(mut self, phase: &str) -> Self {
        self.phase = Some(phase.to_string());
        self
    }

    pub(crate) fn get(self) -> Pod {
        let limits: BTreeMap<String, Quantity> = self
            .mig_requests
            .iter()
            .map(|(name, count)| (name.clone(), Quantity(count.to_string())))
            .collect();

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    resources: (!limits.is_empty()).then(|| ResourceRequirements {
                        limits: Some(limits.clone()),
                        requests: Some(limits),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: self.phase.map(|phase| PodStatus {
                phase: Some(phase),
                ..Default::default()
            }),
        }
    }
}
