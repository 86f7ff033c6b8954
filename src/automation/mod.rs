/// Automation Management Layer
///
/// This module handles automation graph definitions, persistence, and the
/// hot-reload registry:
/// - Type definitions (Automation, Node, Edge)
/// - SQLite persistence with sqlx
/// - Lock-free hot-reload registry using ArcSwap

// Core automation type definitions
pub mod types;

// SQLite persistence layer for automation storage
pub mod storage;

// Hot-reload registry using ArcSwap for zero-downtime updates
pub mod registry;

// Re-export commonly used types
pub use types::{Automation, AutomationStatus, Edge, Node, NodeData, NodeKind};
