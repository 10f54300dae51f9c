//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the entities storage contract used by services and callers.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Every engine validates list names and whole save batches before writing.
//! - Engines return not-found as absent values, not errors.

pub mod entities_repo;
pub mod memory_repo;
pub mod sqlite_repo;
