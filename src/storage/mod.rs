//! Persistent store: JSON records in a single SQLite key-value table.
//!
//! Each logical record (history log, liked/skipped logs, topic weights,
//! last decay time) is read and written wholesale.

mod history;
mod records;
mod schema;
mod topics;
mod types;

pub use schema::Database;
pub use types::{keys, DatabaseError, HistoryEntry, InteractionRecord, TopicWeight, HISTORY_CAP};
