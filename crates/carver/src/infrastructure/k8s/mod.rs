mod node_watcher;
mod types;

pub use node_watcher::NodeWatcher;
pub use types::KubernetesError;
