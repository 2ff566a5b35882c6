//! Spatial index maintenance for declared geometry columns.

use crate::db::{table_exists, DbError, DbResult};
use crate::model::tables::TableDescriptor;
use log::{debug, info};
use rusqlite::Connection;

/// Storage flavor deciding which index functions and tables apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialFlavor {
    Spatialite,
    GeoPackage,
}

impl SpatialFlavor {
    fn index_table(self, table: &str, column: &str) -> String {
        match self {
            Self::Spatialite => format!("idx_{table}_{column}"),
            Self::GeoPackage => format!("rtree_{table}_{column}"),
        }
    }

    fn create_sql(self) -> &'static str {
        match self {
            Self::Spatialite => "SELECT CreateSpatialIndex(?1, ?2)",
            Self::GeoPackage => "SELECT gpkgAddSpatialIndex(?1, ?2)",
        }
    }
}

/// Creates missing spatial indexes for every geometry column in `models`.
///
/// Returns the `table.column` pairs that received a new index.
pub fn ensure_spatial_indexes(
    conn: &Connection,
    flavor: SpatialFlavor,
    models: &[TableDescriptor],
) -> DbResult<Vec<String>> {
    let mut created = Vec::new();
    for table in models {
        for column in table.geometry_columns() {
            if table_exists(conn, &flavor.index_table(table.name, column.name))? {
                continue;
            }
            let status = conn.query_row(flavor.create_sql(), [table.name, column.name], |row| {
                row.get::<_, Option<i64>>(0)
            })?;
            if status == Some(0) {
                return Err(DbError::InvalidData(format!(
                    "spatial index creation refused for {}.{}",
                    table.name, column.name
                )));
            }
            debug!(
                "event=spatial_index module=spatial status=ok table={} column={}",
                table.name, column.name
            );
            created.push(format!("{}.{}", table.name, column.name));
        }
    }
    info!(
        "event=spatial_indexes module=spatial status=ok created={}",
        created.len()
    );
    Ok(created)
}
