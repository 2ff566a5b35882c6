//! SpatiaLite library and file format detection.

use crate::db::{table_exists, DbResult};
use rusqlite::Connection;

/// Loaded SpatiaLite library version and the file's catalog layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialiteVersion {
    /// Major version of the loaded library; `None` without the extension.
    pub library: Option<u32>,
    /// 3 for the legacy catalog layout, 4 for the current one.
    pub file: u32,
}

impl SpatialiteVersion {
    /// Whether the file can be rebuilt in the newer catalog layout.
    pub fn is_upgradable(&self) -> bool {
        self.file == 3 && matches!(self.library, Some(4 | 5))
    }
}

pub fn spatialite_version(conn: &Connection) -> DbResult<SpatialiteVersion> {
    Ok(SpatialiteVersion {
        library: library_major_version(conn),
        file: file_version(conn)?,
    })
}

fn library_major_version(conn: &Connection) -> Option<u32> {
    let version = conn
        .query_row("SELECT spatialite_version()", [], |row| row.get::<_, String>(0))
        .ok()?;
    version.split('.').next()?.trim().parse().ok()
}

fn file_version(conn: &Connection) -> DbResult<u32> {
    if !table_exists(conn, "geometry_columns")? {
        return Ok(3);
    }
    let mut stmt = conn.prepare("PRAGMA table_info(geometry_columns)")?;
    let has_geometry_type = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?
        .iter()
        .any(|column| column == "geometry_type");
    Ok(if has_geometry_type { 4 } else { 3 })
}
