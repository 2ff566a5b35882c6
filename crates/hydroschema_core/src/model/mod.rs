//! Schema domain model: revisions and the declared table descriptor.
//!
//! # Responsibility
//! - Define revision identifiers shared by the chain and the orchestrator.
//! - Describe the tables and columns present at the chain head.
//!
//! # Invariants
//! - `DECLARED_MODELS` matches the tables produced by the head migration.

pub mod tables;
pub mod version;
