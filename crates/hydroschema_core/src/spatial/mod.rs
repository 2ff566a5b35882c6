//! Spatial catalog maintenance.
//!
//! # Responsibility
//! - Detect SpatiaLite library and file layout versions.
//! - Recreate derived views and their geometry registrations.
//! - Create missing spatial indexes for declared geometry columns.
//! - Copy declared tables between databases.
//!
//! # Invariants
//! - View recreation is all-or-nothing per call.
//! - Only tables in the descriptor are copied or indexed.

pub mod copy;
pub mod index;
pub mod version;
pub mod views;

pub use copy::{copy_models, copy_table};
pub use index::{ensure_spatial_indexes, SpatialFlavor};
pub use version::{spatialite_version, SpatialiteVersion};
pub use views::{recreate_views, ViewDefinition, ALL_VIEWS, VIEWS_TO_DELETE};
