/// Automation runtime - the engine and everything it executes with
///
/// - engine: sequential graph walker with fail-fast node semantics
/// - handlers: per-node-type action handler registry
/// - hooks: lifecycle observer seam (run/node audit records live here)
/// - variables: {{dotted.path}} placeholder resolution

pub mod engine;
pub mod handlers;
pub mod hooks;
pub mod variables;

pub use engine::ExecutionEngine;
pub use handlers::{ActionContext, ActionHandler, ActionResult, HandlerRegistry, HandlerServices};
pub use hooks::{run_logging_hooks, FailurePolicy, LifecycleHooks};
pub use variables::{resolve_json_template, resolve_template, ResolveContext};
