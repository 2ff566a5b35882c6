//! Schema management for hydraulic model SpatiaLite/GeoPackage databases.
//!
//! The crate resolves a file's schema revision, runs the migration chain up
//! to the head (optionally inside a copy-based file transaction), recreates
//! views and spatial indexes, and converts SpatiaLite files to GeoPackage.

pub mod convert;
pub mod db;
pub mod logging;
pub mod model;
pub mod schema;
pub mod spatial;

pub use convert::{Ogr2Ogr, TranslateOutcome, VectorTranslator};
pub use db::{DatabaseConfig, DbError, DbResult, FileTransaction, SchemaDatabase};
pub use logging::{default_log_level, init_logging, logging_status};
pub use db::migrations::{builtin_chain, Migration, MigrationAction, MigrationChain};
pub use model::tables::{ColumnDescriptor, GeometryType, TableDescriptor, DECLARED_MODELS};
pub use model::version::{SchemaVersion, TargetRevision};
pub use schema::{
    ModelSchema, SchemaError, SchemaResult, SchemaWarning, UpgradeOptions, UpgradeReport,
};

/// Head revision of the built-in migration chain.
pub fn schema_head() -> SchemaVersion {
    builtin_chain().head().revision
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
