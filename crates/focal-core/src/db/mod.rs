//! Durable state owned by the sync engine
//!
//! One SQLite database holds the offline queue, session history,
//! open conflicts, and the resolution audit log.

mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
mod session_repository;

pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use connection::{Database, SharedDatabase};
pub use queue_repository::{QueueRepository, QueueStats, SqliteQueueRepository};
pub use session_repository::{
    OperationAggregates, SessionAggregates, SessionRepository, SqliteSessionRepository,
};
