//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `hydroschema_core` linkage.
//! - Print the schema head revision shipped with this build.

fn main() {
    println!("hydroschema_core version={}", hydroschema_core::core_version());
    println!("hydroschema_core schema_head={}", hydroschema_core::schema_head());
}
