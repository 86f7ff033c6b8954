/// Run observability layer
///
/// Persisted audit rows for automation runs (RunRecord) and per-node
/// outcomes (NodeLog). Written exclusively through the lifecycle hooks.

pub mod storage;
pub mod types;

pub use storage::RunLogStorage;
pub use types::{NodeLog, NodeStatus, RunRecord, RunStatus};
