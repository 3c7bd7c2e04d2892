pub mod device_client;
pub mod k8s;
pub(crate) mod kube_client;
pub mod logging;
pub mod reconciler;
