/// Zapflow: contact-centric automation workflow engine
///
/// Automations are directed graphs of trigger, action and logic nodes.
/// The engine walks a graph from its trigger node, executes each node's
/// side effect through a pluggable handler registry, threads the acting
/// contact through the walk, and records every run and node outcome.

// Core configuration and setup
pub mod config;

// Automation definitions - types, persistence, hot-reload registry
pub mod automation;

// Contacts - the entity a run acts on
pub mod contact;

// CRM deals and pipeline stages
pub mod crm;

// Outbound messaging - transport trait and message templates
pub mod messaging;

// Run and node audit records
pub mod runlog;

// Runtime - execution engine, action handlers, lifecycle hooks,
// variable resolution
pub mod runtime;

// HTTP API layer - automation management and trigger ingestion
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use automation::{Automation, AutomationStatus, Edge, Node, NodeKind};
pub use contact::Contact;
pub use runtime::{ActionHandler, ExecutionEngine, HandlerRegistry, LifecycleHooks};
pub use server::start_server;
