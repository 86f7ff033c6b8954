/// Sequential automation execution engine
///
/// Walks an automation graph one node at a time starting from the
/// trigger node. For each node it looks up the handler for the node
/// type, fires the node lifecycle events around the handler call,
/// threads the (possibly updated) contact into the next step, and
/// follows the outgoing edge selected by the handler's output handle.
///
/// Runs are fail-fast: the first node error stops the walk, and the
/// remaining nodes never execute. The public entry point never returns
/// an error - every outcome, including engine bugs, settles into the
/// workflow-after event and the run record.

use crate::automation::{Automation, Edge, Node, NodeKind};
use crate::contact::Contact;
use crate::messaging::ChannelProfile;
use crate::runlog::{NodeStatus, RunLogStorage, RunStatus};
use crate::runtime::handlers::{ActionContext, HandlerRegistry};
use crate::runtime::hooks::{run_logging_hooks, LifecycleHooks};
use anyhow::Result;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Hard cap on nodes executed per run, guards against edge cycles
const MAX_STEPS: usize = 256;

/// Detail recorded when a node succeeds without reporting its own
const DEFAULT_NODE_DETAIL: &str = "Executed successfully.";

#[derive(Clone)]
pub struct ExecutionEngine {
    handlers: Arc<HandlerRegistry>,
    run_logs: RunLogStorage,
}

impl ExecutionEngine {
    pub fn new(handlers: Arc<HandlerRegistry>, run_logs: RunLogStorage) -> Self {
        Self { handlers, run_logs }
    }

    /// Execute one automation run with the default run-logging hooks
    ///
    /// Infallible by contract: failures are logged and recorded on the
    /// run, never surfaced to the caller. Safe to tokio::spawn.
    pub async fn execute_automation(
        &self,
        automation: &Automation,
        contact: Option<Contact>,
        start_node_id: &str,
        trigger_payload: Option<Value>,
        profile: &ChannelProfile,
    ) {
        let hooks = run_logging_hooks(
            self.run_logs.clone(),
            automation.id.clone(),
            contact.as_ref().map(|c| c.id.clone()),
            automation.team_id.clone(),
        );

        self.execute_with_hooks(automation, contact, start_node_id, trigger_payload, profile, &hooks)
            .await;
    }

    /// Execute one automation run against caller-supplied hooks
    pub async fn execute_with_hooks(
        &self,
        automation: &Automation,
        contact: Option<Contact>,
        start_node_id: &str,
        trigger_payload: Option<Value>,
        profile: &ChannelProfile,
        hooks: &LifecycleHooks,
    ) {
        tracing::info!(
            "🚀 Starting automation '{}' ({}) from node '{}'",
            automation.name,
            automation.id,
            start_node_id
        );

        if let Err(e) = hooks.workflow_before().await {
            tracing::error!("❌ Automation '{}' aborted before first node: {}", automation.id, e);
            // Best effort: with no run record this settles as a no-op
            if let Err(after) = hooks.workflow_after(RunStatus::Failed, &e.to_string()).await {
                tracing::warn!("⚠️ workflow-after failed after aborted start: {}", after);
            }
            return;
        }

        match self
            .run(automation, contact, start_node_id, trigger_payload.as_ref(), profile, hooks)
            .await
        {
            Ok(()) => {
                tracing::info!("✅ Automation '{}' completed", automation.id);
                if let Err(e) = hooks.workflow_after(RunStatus::Success, "Workflow completed.").await {
                    tracing::warn!("⚠️ workflow-after failed on success: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("❌ Automation '{}' failed: {}", automation.id, e);
                if let Err(after) = hooks.workflow_after(RunStatus::Failed, &e.to_string()).await {
                    tracing::warn!("⚠️ workflow-after failed on failure: {}", after);
                }
            }
        }
    }

    /// The fail-fast node walk
    async fn run(
        &self,
        automation: &Automation,
        mut contact: Option<Contact>,
        start_node_id: &str,
        trigger_payload: Option<&Value>,
        profile: &ChannelProfile,
        hooks: &LifecycleHooks,
    ) -> Result<()> {
        let nodes_by_id: HashMap<&str, &Node> = automation
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();

        // Duplicate keys overwrite: the last edge in the definition wins
        let edges_by_key: HashMap<String, &Edge> = automation
            .edges
            .iter()
            .map(|edge| (edge.key(), edge))
            .collect();

        let mut current_id = start_node_id.to_string();
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > MAX_STEPS {
                return Err(anyhow::anyhow!(
                    "Automation '{}' exceeded {} steps, aborting (edge cycle?)",
                    automation.id,
                    MAX_STEPS
                ));
            }

            // A key that resolves to no node ends the walk; there is no
            // explicit terminal node type
            let Some(node) = nodes_by_id.get(current_id.as_str()).copied() else {
                tracing::debug!("🏁 No node '{}' in automation, path ends", current_id);
                return Ok(());
            };

            // Trigger nodes are entry markers matched by the trigger
            // layer; they carry no action and are never dispatched.
            // Follow their default edge into the first real step.
            if node.data.kind == NodeKind::Trigger {
                tracing::debug!("⏩ Skipping trigger node '{}', following its edge", node.id);
                let Some(edge) = edges_by_key.get(node.id.as_str()) else {
                    return Ok(());
                };
                current_id = edge.target.clone();
                continue;
            }

            // Routing failures precede the node lifecycle events
            let handler = self
                .handlers
                .get(&node.data.node_type)
                .ok_or_else(|| {
                    anyhow::anyhow!("No handler found for node type: {}", node.data.node_type)
                })?;

            hooks.node_before(node).await?;

            tracing::debug!("▶️ Executing node '{}' ({})", node.id, node.data.node_type);

            let ctx = ActionContext {
                contact: contact.as_ref(),
                trigger_payload,
                node,
                automation_id: &automation.id,
                team_id: &automation.team_id,
                profile,
            };

            let result = match handler.execute(&ctx).await {
                Ok(result) => result,
                Err(e) => {
                    let details = e.to_string();
                    if let Err(after) = hooks.node_after(node, NodeStatus::Failed, &details).await {
                        tracing::warn!("⚠️ node-after failed for '{}': {}", node.id, after);
                    }
                    return Err(e);
                }
            };

            let details = result.details.as_deref().unwrap_or(DEFAULT_NODE_DETAIL);
            hooks.node_after(node, NodeStatus::Success, details).await?;

            if let Some(updated) = result.updated_contact {
                contact = Some(updated);
            }

            let edge_key = match &result.output_handle {
                Some(handle) => format!("{}-{}", node.id, handle),
                None => node.id.clone(),
            };

            let Some(edge) = edges_by_key.get(edge_key.as_str()) else {
                // No outgoing edge on the selected exit: the path ends here
                tracing::debug!("🏁 Node '{}' has no edge for key '{}'", node.id, edge_key);
                return Ok(());
            };

            current_id = edge.target.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{AutomationStatus, NodeKind};
    use crate::contact::ContactStorage;
    use crate::crm::DealStorage;
    use crate::messaging::{MessageTransport, TemplateStorage};
    use crate::runtime::handlers::tests::{contact, profile, MockTransport};
    use crate::runtime::handlers::{ActionHandler, ActionResult, HandlerRegistry, HandlerServices};
    use crate::runtime::hooks::FailurePolicy;
    use async_trait::async_trait;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::Mutex;

    /// Scripted handler recording each visit on a shared log
    struct StepHandler {
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
        add_tag: Option<String>,
        handle: Option<String>,
    }

    impl StepHandler {
        fn recording(log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                log: Arc::clone(log),
                fail: false,
                add_tag: None,
                handle: None,
            })
        }

        fn failing(log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                log: Arc::clone(log),
                fail: true,
                add_tag: None,
                handle: None,
            })
        }

        fn tagging(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Arc<Self> {
            Arc::new(Self {
                log: Arc::clone(log),
                fail: false,
                add_tag: Some(tag.to_string()),
                handle: None,
            })
        }
    }

    #[async_trait]
    impl ActionHandler for StepHandler {
        async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
            let tags = ctx
                .contact
                .map(|c| c.tags.join(","))
                .unwrap_or_default();
            self.log.lock().await.push(format!("{}[{}]", ctx.node.id, tags));

            if self.fail {
                return Err(anyhow::anyhow!("step '{}' blew up", ctx.node.id));
            }

            let updated_contact = self.add_tag.as_ref().and_then(|tag| {
                ctx.contact.map(|c| {
                    let mut updated = c.clone();
                    updated.tags.push(tag.clone());
                    updated
                })
            });

            Ok(ActionResult {
                updated_contact,
                details: None,
                output_handle: self.handle.clone(),
            })
        }
    }

    async fn run_log_storage() -> RunLogStorage {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = RunLogStorage::new(pool);
        storage.init_schema().await.unwrap();
        storage
    }

    fn node(id: &str, node_type: &str, config: serde_json::Value) -> Node {
        Node::new(id, NodeKind::Action, node_type, id, config)
    }

    fn edge(id: &str, source: &str, handle: Option<&str>, target: &str) -> Edge {
        Edge {
            id: id.to_string(),
            source: source.to_string(),
            source_handle: handle.map(str::to_string),
            target: target.to_string(),
        }
    }

    fn automation(nodes: Vec<Node>, edges: Vec<Edge>) -> Automation {
        Automation {
            id: "auto-1".to_string(),
            team_id: "team-1".to_string(),
            name: "Test automation".to_string(),
            status: AutomationStatus::Active,
            nodes,
            edges,
        }
    }

    async fn engine_with(registry: HandlerRegistry) -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(registry), run_log_storage().await)
    }

    #[tokio::test]
    async fn linear_chain_executes_in_edge_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("step", StepHandler::recording(&log));

        let automation = automation(
            vec![
                node("a", "step", json!({})),
                node("b", "step", json!({})),
                node("c", "step", json!({})),
            ],
            vec![edge("e1", "a", None, "b"), edge("e2", "b", None, "c")],
        );

        let engine = engine_with(registry).await;
        engine
            .execute_automation(&automation, None, "a", None, &profile())
            .await;

        assert_eq!(*log.lock().await, vec!["a[]", "b[]", "c[]"]);
    }

    #[tokio::test]
    async fn trigger_entry_node_is_skipped_not_dispatched() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("step", StepHandler::recording(&log));

        // No handler is registered for "inbound_message"; the trigger
        // node must be routed through, not executed
        let automation = automation(
            vec![
                Node::new("start", NodeKind::Trigger, "inbound_message", "Inbound", json!({})),
                node("a", "step", json!({})),
            ],
            vec![edge("e1", "start", None, "a")],
        );

        let storage = run_log_storage().await;
        let engine = ExecutionEngine::new(Arc::new(registry), storage.clone());
        engine
            .execute_automation(&automation, None, "start", None, &profile())
            .await;

        assert_eq!(*log.lock().await, vec!["a[]"]);

        let runs = storage.list_runs("auto-1", 10).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Success);

        // The trigger node leaves no audit row of its own
        let logs = storage.list_node_logs(&runs[0].id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].node_id, "a");
    }

    #[tokio::test]
    async fn contact_updates_thread_into_later_nodes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("tagger", StepHandler::tagging(&log, "vip"));
        registry.register("step", StepHandler::recording(&log));

        let automation = automation(
            vec![node("a", "tagger", json!({})), node("b", "step", json!({}))],
            vec![edge("e1", "a", None, "b")],
        );

        let engine = engine_with(registry).await;
        engine
            .execute_automation(&automation, Some(contact()), "a", None, &profile())
            .await;

        assert_eq!(*log.lock().await, vec!["a[lead]", "b[lead,vip]"]);
    }

    #[tokio::test]
    async fn branch_follows_the_handle_qualified_edge() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let services = test_services().await;
        let mut registry = HandlerRegistry::builtin(services);
        registry.register("step", StepHandler::recording(&log));

        let automation = automation(
            vec![
                node(
                    "cond",
                    "condition",
                    json!({"field": "contact.tags", "operator": "contains", "value": "lead"}),
                ),
                node("yes", "step", json!({})),
                node("no", "step", json!({})),
            ],
            vec![
                edge("e1", "cond", Some("true"), "yes"),
                edge("e2", "cond", Some("false"), "no"),
            ],
        );

        let engine = engine_with(registry).await;
        engine
            .execute_automation(&automation, Some(contact()), "cond", None, &profile())
            .await;

        assert_eq!(*log.lock().await, vec!["yes[lead]"]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_walk_and_records_it_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("step", StepHandler::recording(&log));
        registry.register("boom", StepHandler::failing(&log));

        let automation = automation(
            vec![
                node("a", "step", json!({})),
                node("b", "boom", json!({})),
                node("c", "step", json!({})),
            ],
            vec![edge("e1", "a", None, "b"), edge("e2", "b", None, "c")],
        );

        let storage = run_log_storage().await;
        let engine = ExecutionEngine::new(Arc::new(registry), storage.clone());
        engine
            .execute_automation(&automation, None, "a", None, &profile())
            .await;

        // Node 'c' never ran
        assert_eq!(*log.lock().await, vec!["a[]", "b[]"]);

        let runs = storage.list_runs("auto-1", 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].details.contains("step 'b' blew up"));

        let logs = storage.list_node_logs(&runs[0].id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].node_id, "a");
        assert_eq!(logs[0].status, NodeStatus::Success);
        assert_eq!(logs[0].details, "Executed successfully.");
        assert_eq!(logs[1].node_id, "b");
        assert_eq!(logs[1].status, NodeStatus::Failed);
    }

    #[tokio::test]
    async fn dangling_edge_ends_the_run_successfully() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("step", StepHandler::recording(&log));

        let automation = automation(
            vec![node("a", "step", json!({}))],
            vec![edge("e1", "a", None, "ghost")],
        );

        let storage = run_log_storage().await;
        let engine = ExecutionEngine::new(Arc::new(registry), storage.clone());
        engine
            .execute_automation(&automation, None, "a", None, &profile())
            .await;

        let runs = storage.list_runs("auto-1", 10).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].details, "Workflow completed.");
    }

    #[tokio::test]
    async fn unroutable_node_type_fails_before_node_hooks_fire() {
        let registry = HandlerRegistry::new();
        let storage = run_log_storage().await;
        let engine = ExecutionEngine::new(Arc::new(registry), storage.clone());

        let automation = automation(vec![node("a", "teleport", json!({}))], vec![]);

        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut hooks = run_logging_hooks(
            storage.clone(),
            automation.id.clone(),
            None,
            automation.team_id.clone(),
        );
        {
            let seen = Arc::clone(&seen);
            hooks.on_node_before(
                FailurePolicy::LogAndContinue,
                Box::new(move |node| {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move {
                        seen.lock().await.push(node.id);
                        Ok(())
                    })
                }),
            );
        }

        engine
            .execute_with_hooks(&automation, None, "a", None, &profile(), &hooks)
            .await;

        // The routing failure precedes the node-before event
        assert!(seen.lock().await.is_empty());

        let runs = storage.list_runs("auto-1", 10).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].details, "No handler found for node type: teleport");
        assert!(storage.list_node_logs(&runs[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_observer_with_log_and_continue_never_stops_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("step", StepHandler::recording(&log));

        let automation = automation(
            vec![node("a", "step", json!({})), node("b", "step", json!({}))],
            vec![edge("e1", "a", None, "b")],
        );

        let mut hooks = LifecycleHooks::new();
        hooks.on_node_after(
            FailurePolicy::LogAndContinue,
            Box::new(|_, _, _| Box::pin(async { Err(anyhow::anyhow!("observer down")) })),
        );

        let engine = engine_with(registry).await;
        engine
            .execute_with_hooks(&automation, None, "a", None, &profile(), &hooks)
            .await;

        assert_eq!(*log.lock().await, vec!["a[]", "b[]"]);
    }

    #[tokio::test]
    async fn duplicate_edge_keys_resolve_to_the_last_edge() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("step", StepHandler::recording(&log));

        let automation = automation(
            vec![
                node("a", "step", json!({})),
                node("b", "step", json!({})),
                node("c", "step", json!({})),
            ],
            vec![edge("e1", "a", None, "b"), edge("e2", "a", None, "c")],
        );

        let engine = engine_with(registry).await;
        engine
            .execute_automation(&automation, None, "a", None, &profile())
            .await;

        assert_eq!(*log.lock().await, vec!["a[]", "c[]"]);
    }

    #[tokio::test]
    async fn edge_cycle_fails_instead_of_spinning_forever() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register("step", StepHandler::recording(&log));

        let automation = automation(
            vec![node("a", "step", json!({})), node("b", "step", json!({}))],
            vec![edge("e1", "a", None, "b"), edge("e2", "b", None, "a")],
        );

        let storage = run_log_storage().await;
        let engine = ExecutionEngine::new(Arc::new(registry), storage.clone());
        engine
            .execute_automation(&automation, None, "a", None, &profile())
            .await;

        let runs = storage.list_runs("auto-1", 10).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].details.contains("exceeded"));
    }

    async fn test_services() -> HandlerServices {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let contacts = ContactStorage::new(pool.clone());
        contacts.init_schema().await.unwrap();
        let templates = TemplateStorage::new(pool.clone());
        templates.init_schema().await.unwrap();
        let deals = DealStorage::new(pool);
        deals.init_schema().await.unwrap();

        HandlerServices {
            contacts,
            templates,
            deals,
            transport: MockTransport::new() as Arc<dyn MessageTransport>,
            http: reqwest::Client::new(),
        }
    }
}
