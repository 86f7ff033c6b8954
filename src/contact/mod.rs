/// Contact layer - the acting entity automations operate on
///
/// - Type definitions (Contact)
/// - SQLite persistence with sqlx (JSON columns for tags/custom fields)

pub mod storage;
pub mod types;

pub use storage::ContactStorage;
pub use types::Contact;
