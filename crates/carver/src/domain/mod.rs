pub mod device;
pub mod partitioning;
pub mod snapshot;
pub mod state;
