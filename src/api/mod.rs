/// HTTP API layer
///
/// REST endpoints for automation management and inbound trigger
/// ingestion:
/// - Automation CRUD with registry hot-reload
/// - Run record and node log reads
/// - Trigger dispatch (202, execution runs out-of-band)

// Automation management endpoints (POST/GET/PUT/DELETE)
pub mod automations;

// Inbound trigger dispatch endpoints
pub mod triggers;

// Re-export router builders
pub use automations::create_automation_routes;
pub use triggers::create_trigger_routes;
