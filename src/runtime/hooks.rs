/// Lifecycle hook registry
///
/// Observer seam decoupling the execution engine from persistence and
/// logging. Four events - workflow-before, workflow-after, node-before,
/// node-after - each with any number of subscribers, invoked
/// sequentially and awaited in registration order.
///
/// Every subscriber declares a FailurePolicy. Escalate aborts the event
/// (and, for workflow-before, the whole run); LogAndContinue records the
/// failure and keeps invoking later subscribers, so a persistence outage
/// in one observer never silences the others.

use crate::automation::Node;
use crate::runlog::{NodeStatus, RunLogStorage, RunStatus};
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What to do when a subscriber returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the event and surface the error to the engine
    Escalate,
    /// Log the failure and keep invoking later subscribers
    LogAndContinue,
}

/// Callback invoked before the first node of a run
pub type WorkflowBeforeFn = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;
/// Callback invoked after the run settles, with its final status
pub type WorkflowAfterFn =
    Box<dyn Fn(RunStatus, String) -> BoxFuture<'static, Result<()>> + Send + Sync>;
/// Callback invoked before each node executes
pub type NodeBeforeFn = Box<dyn Fn(Node) -> BoxFuture<'static, Result<()>> + Send + Sync>;
/// Callback invoked after each node settles, with its outcome
pub type NodeAfterFn =
    Box<dyn Fn(Node, NodeStatus, String) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Subscriber<F> {
    callback: F,
    on_failure: FailurePolicy,
}

/// Per-run hook registry
///
/// Constructed fresh for every run; no state is shared across runs.
#[derive(Default)]
pub struct LifecycleHooks {
    workflow_before: Vec<Subscriber<WorkflowBeforeFn>>,
    workflow_after: Vec<Subscriber<WorkflowAfterFn>>,
    node_before: Vec<Subscriber<NodeBeforeFn>>,
    node_after: Vec<Subscriber<NodeAfterFn>>,
}

impl LifecycleHooks {
    /// Empty registry with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_workflow_before(&mut self, on_failure: FailurePolicy, callback: WorkflowBeforeFn) {
        self.workflow_before.push(Subscriber { callback, on_failure });
    }

    pub fn on_workflow_after(&mut self, on_failure: FailurePolicy, callback: WorkflowAfterFn) {
        self.workflow_after.push(Subscriber { callback, on_failure });
    }

    pub fn on_node_before(&mut self, on_failure: FailurePolicy, callback: NodeBeforeFn) {
        self.node_before.push(Subscriber { callback, on_failure });
    }

    pub fn on_node_after(&mut self, on_failure: FailurePolicy, callback: NodeAfterFn) {
        self.node_after.push(Subscriber { callback, on_failure });
    }

    /// Fire the workflow-before event
    pub async fn workflow_before(&self) -> Result<()> {
        for subscriber in &self.workflow_before {
            if let Err(e) = (subscriber.callback)().await {
                match subscriber.on_failure {
                    FailurePolicy::Escalate => return Err(e),
                    FailurePolicy::LogAndContinue => {
                        tracing::warn!("⚠️ workflow-before subscriber failed: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fire the workflow-after event with the run's final status
    pub async fn workflow_after(&self, status: RunStatus, details: &str) -> Result<()> {
        for subscriber in &self.workflow_after {
            if let Err(e) = (subscriber.callback)(status, details.to_string()).await {
                match subscriber.on_failure {
                    FailurePolicy::Escalate => return Err(e),
                    FailurePolicy::LogAndContinue => {
                        tracing::warn!("⚠️ workflow-after subscriber failed: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fire the node-before event
    pub async fn node_before(&self, node: &Node) -> Result<()> {
        for subscriber in &self.node_before {
            if let Err(e) = (subscriber.callback)(node.clone()).await {
                match subscriber.on_failure {
                    FailurePolicy::Escalate => return Err(e),
                    FailurePolicy::LogAndContinue => {
                        tracing::warn!("⚠️ node-before subscriber failed for '{}': {}", node.id, e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fire the node-after event with the node's outcome
    pub async fn node_after(&self, node: &Node, status: NodeStatus, details: &str) -> Result<()> {
        for subscriber in &self.node_after {
            if let Err(e) = (subscriber.callback)(node.clone(), status, details.to_string()).await {
                match subscriber.on_failure {
                    FailurePolicy::Escalate => return Err(e),
                    FailurePolicy::LogAndContinue => {
                        tracing::warn!("⚠️ node-after subscriber failed for '{}': {}", node.id, e);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Default run-logging subscribers, bound to one run's identifiers
///
/// workflow-before inserts the run row (Escalate - an untracked run is
/// not worth executing) and parks the generated run id in a per-run
/// cell; workflow-after and node-after write through it with
/// LogAndContinue, so a logging outage never stops the workflow.
/// node-before stays unsubscribed as a reserved extension point.
pub fn run_logging_hooks(
    storage: RunLogStorage,
    automation_id: String,
    contact_id: Option<String>,
    team_id: String,
) -> LifecycleHooks {
    let run_id: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let mut hooks = LifecycleHooks::new();

    {
        let storage = storage.clone();
        let run_id = Arc::clone(&run_id);
        let automation_id = automation_id.clone();
        let team_id = team_id.clone();
        hooks.on_workflow_before(
            FailurePolicy::Escalate,
            Box::new(move || {
                let storage = storage.clone();
                let run_id = Arc::clone(&run_id);
                let automation_id = automation_id.clone();
                let contact_id = contact_id.clone();
                let team_id = team_id.clone();
                Box::pin(async move {
                    let id = storage
                        .create_run(&automation_id, contact_id.as_deref(), &team_id)
                        .await
                        .map_err(|e| anyhow::anyhow!("Failed to create run record: {}", e))?;
                    tracing::debug!("📒 Run record created: {}", id);
                    *run_id.lock().await = Some(id);
                    Ok(())
                })
            }),
        );
    }

    {
        let storage = storage.clone();
        let run_id = Arc::clone(&run_id);
        hooks.on_workflow_after(
            FailurePolicy::LogAndContinue,
            Box::new(move |status, details| {
                let storage = storage.clone();
                let run_id = Arc::clone(&run_id);
                Box::pin(async move {
                    // No-op when workflow-before never captured a run id
                    let Some(id) = run_id.lock().await.clone() else {
                        return Ok(());
                    };
                    storage.update_run_status(&id, status, &details).await
                })
            }),
        );
    }

    {
        let run_id = Arc::clone(&run_id);
        hooks.on_node_after(
            FailurePolicy::LogAndContinue,
            Box::new(move |node, status, details| {
                let storage = storage.clone();
                let run_id = Arc::clone(&run_id);
                let team_id = team_id.clone();
                Box::pin(async move {
                    let Some(id) = run_id.lock().await.clone() else {
                        return Ok(());
                    };
                    storage
                        .insert_node_log(&id, &node.id, &team_id, status, &details)
                        .await
                })
            }),
        );
    }

    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::NodeKind;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    fn node(id: &str) -> Node {
        Node::new(id, NodeKind::Action, "add_tag", "Tag", json!({}))
    }

    #[tokio::test]
    async fn log_and_continue_failure_does_not_block_later_subscribers() {
        let mut hooks = LifecycleHooks::new();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        hooks.on_node_after(
            FailurePolicy::LogAndContinue,
            Box::new(|_, _, _| Box::pin(async { Err(anyhow::anyhow!("persistence outage")) })),
        );

        {
            let seen = Arc::clone(&seen);
            hooks.on_node_after(
                FailurePolicy::LogAndContinue,
                Box::new(move |node, status, _| {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move {
                        seen.lock().await.push(format!("{}:{}", node.id, status));
                        Ok(())
                    })
                }),
            );
        }

        hooks
            .node_after(&node("n1"), NodeStatus::Success, "Executed successfully.")
            .await
            .unwrap();

        assert_eq!(*seen.lock().await, vec!["n1:success".to_string()]);
    }

    #[tokio::test]
    async fn escalate_failure_aborts_the_event() {
        let mut hooks = LifecycleHooks::new();
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        hooks.on_workflow_before(
            FailurePolicy::Escalate,
            Box::new(|| Box::pin(async { Err(anyhow::anyhow!("run row insert failed")) })),
        );

        {
            let seen = Arc::clone(&seen);
            hooks.on_workflow_before(
                FailurePolicy::LogAndContinue,
                Box::new(move || {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move {
                        seen.lock().await.push("second");
                        Ok(())
                    })
                }),
            );
        }

        let err = hooks.workflow_before().await.unwrap_err();
        assert!(err.to_string().contains("run row insert failed"));
        assert!(seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn subscribers_fire_in_registration_order() {
        let mut hooks = LifecycleHooks::new();
        let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3u8 {
            let seen = Arc::clone(&seen);
            hooks.on_node_before(
                FailurePolicy::LogAndContinue,
                Box::new(move |_| {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move {
                        seen.lock().await.push(i);
                        Ok(())
                    })
                }),
            );
        }

        hooks.node_before(&node("n1")).await.unwrap();
        assert_eq!(*seen.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn run_logging_hooks_write_run_and_node_rows() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = RunLogStorage::new(pool);
        storage.init_schema().await.unwrap();

        let hooks = run_logging_hooks(
            storage.clone(),
            "auto-1".to_string(),
            Some("c1".to_string()),
            "team-1".to_string(),
        );

        hooks.workflow_before().await.unwrap();
        hooks
            .node_after(&node("n1"), NodeStatus::Success, "Executed successfully.")
            .await
            .unwrap();
        hooks
            .workflow_after(RunStatus::Success, "Workflow completed.")
            .await
            .unwrap();

        let runs = storage.list_runs("auto-1", 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].details, "Workflow completed.");
        assert_eq!(runs[0].contact_id.as_deref(), Some("c1"));

        let logs = storage.list_node_logs(&runs[0].id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].node_id, "n1");
    }

    #[tokio::test]
    async fn workflow_after_without_captured_run_id_is_a_noop() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = RunLogStorage::new(pool);
        storage.init_schema().await.unwrap();

        let hooks = run_logging_hooks(storage.clone(), "auto-1".to_string(), None, "team-1".to_string());

        // workflow-before never ran, so there is no run id to update
        hooks
            .workflow_after(RunStatus::Failed, "boom")
            .await
            .unwrap();

        assert!(storage.list_runs("auto-1", 10).await.unwrap().is_empty());
    }
}
