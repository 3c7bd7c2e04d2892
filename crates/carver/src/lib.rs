pub mod app;
pub mod config;
mod domain;
mod infrastructure;

// Re-export main modules
pub use domain::device;
pub use domain::partitioning;
pub use domain::snapshot;
pub use domain::state;
pub use infrastructure::device_client;
pub use infrastructure::k8s;
pub use infrastructure::logging;
pub use infrastructure::reconciler;

#[cfg(test)]
pub(crate) mod testutil;
