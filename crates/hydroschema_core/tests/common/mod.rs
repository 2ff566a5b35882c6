#![allow(dead_code)]

use hydroschema_core::{DatabaseConfig, SchemaDatabase};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

thread_local! {
    static INDEX_CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Spatial index calls recorded on the current test thread.
pub fn index_calls() -> Vec<String> {
    INDEX_CALLS.with(|calls| calls.borrow().clone())
}

/// Stands in for the SpatiaLite extension: registers the SQL functions the
/// schema code calls, and lays down catalog tables on blank files the way
/// `InitSpatialMetadata` would.
pub fn spatial_stubs(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8;
    conn.create_scalar_function("spatialite_version", 0, flags, |_| Ok("5.0.1".to_string()))?;
    conn.create_scalar_function("InitSpatialMetadata", 1, flags, |_| Ok(1i64))?;
    conn.create_scalar_function("RecoverGeometryColumn", 5, flags, |_| Ok(1i64))?;
    conn.create_scalar_function("CreateSpatialIndex", 2, flags, |ctx| {
        let table: String = ctx.get(0)?;
        let column: String = ctx.get(1)?;
        INDEX_CALLS.with(|calls| calls.borrow_mut().push(format!("spatialite:{table}.{column}")));
        Ok(1i64)
    })?;
    conn.create_scalar_function("gpkgAddSpatialIndex", 2, flags, |ctx| {
        let table: String = ctx.get(0)?;
        let column: String = ctx.get(1)?;
        INDEX_CALLS.with(|calls| calls.borrow_mut().push(format!("gpkg:{table}.{column}")));
        Ok(None::<i64>)
    })?;

    let objects: i64 = conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))?;
    if objects == 0 {
        create_spatial_metadata(conn, 4)?;
    }
    Ok(())
}

pub fn create_spatial_metadata(conn: &Connection, file_version: u32) -> rusqlite::Result<()> {
    if file_version == 3 {
        conn.execute_batch(
            "CREATE TABLE geometry_columns (
                f_table_name VARCHAR(256), f_geometry_column VARCHAR(256), type VARCHAR(30),
                coord_dimension VARCHAR(30), srid INTEGER, spatial_index_enabled INTEGER
            );
            CREATE TABLE views_geometry_columns (
                view_name VARCHAR(256), view_geometry VARCHAR(256), view_rowid VARCHAR(256),
                f_table_name VARCHAR(256), f_geometry_column VARCHAR(256)
            );",
        )
    } else {
        conn.execute_batch(
            "CREATE TABLE geometry_columns (
                f_table_name TEXT, f_geometry_column TEXT, geometry_type INTEGER,
                coord_dimension INTEGER, srid INTEGER, spatial_index_enabled INTEGER
            );
            CREATE TABLE views_geometry_columns (
                view_name TEXT, view_geometry TEXT, view_rowid TEXT,
                f_table_name TEXT, f_geometry_column TEXT, read_only INTEGER
            );
            CREATE TABLE spatialite_history (
                event_id INTEGER PRIMARY KEY AUTOINCREMENT, table_name TEXT, event TEXT
            );",
        )
    }
}

/// Writes a model database as produced by the legacy migration framework.
///
/// `v2_manhole.connection_node_id` is nullable here, unlike in the chain.
pub fn create_legacy_database(path: &Path, south_id: i64, file_version: u32) {
    let conn = Connection::open(path).unwrap();
    create_spatial_metadata(&conn, file_version).unwrap();
    conn.execute_batch(
        "CREATE TABLE south_migrationhistory (
            id INTEGER PRIMARY KEY, app_name VARCHAR(255), migration VARCHAR(255)
        );
        CREATE TABLE v2_global_settings (
            id INTEGER PRIMARY KEY NOT NULL, name VARCHAR(128), sim_time_step REAL,
            dem_file VARCHAR(255), use_2d_flow BOOLEAN, numerical_settings_id INTEGER
        );
        CREATE TABLE v2_numerical_settings (
            id INTEGER PRIMARY KEY NOT NULL, max_degree INTEGER,
            frict_shallow_water_correction INTEGER, use_of_nested_newton INTEGER
        );
        CREATE TABLE v2_connection_nodes (
            id INTEGER PRIMARY KEY NOT NULL, code VARCHAR(100), storage_area REAL,
            initial_waterlevel REAL, the_geom POINT, the_geom_linestring LINESTRING
        );
        CREATE TABLE v2_manhole (
            id INTEGER PRIMARY KEY NOT NULL, display_name VARCHAR(255), code VARCHAR(100),
            connection_node_id INTEGER, bottom_level REAL, surface_level REAL
        );
        CREATE TABLE v2_channel (
            id INTEGER PRIMARY KEY NOT NULL, display_name VARCHAR(255), code VARCHAR(100),
            calculation_type INTEGER, connection_node_start_id INTEGER,
            connection_node_end_id INTEGER, the_geom LINESTRING
        );
        CREATE TABLE v2_cross_section_location (
            id INTEGER PRIMARY KEY NOT NULL, code VARCHAR(100), reference_level REAL,
            friction_type INTEGER, friction_value REAL NOT NULL, bank_level REAL,
            channel_id INTEGER NOT NULL, the_geom POINT
        );
        INSERT INTO v2_numerical_settings VALUES (1, 700, 0, 1);
        INSERT INTO v2_global_settings VALUES (1, 'bergermeer', 30.0, 'rasters/dem.tif', 1, 1);
        INSERT INTO v2_connection_nodes VALUES (1, 'node-a', 1.5, -1.0, X'0001', NULL);
        INSERT INTO v2_connection_nodes VALUES (2, 'node-b', 2.0, -1.2, X'0002', NULL);
        INSERT INTO v2_manhole VALUES (1, 'MH 1', 'mh-1', 1, -2.5, 0.5);
        INSERT INTO v2_channel VALUES (1, 'Channel 1', 'ch-1', 101, 1, 2, X'0003');
        INSERT INTO v2_cross_section_location VALUES (1, 'loc-1', -2.0, 2, 0.03, 0.8, 1, X'0004');",
    )
    .unwrap();
    for id in (south_id - 2).max(1)..=south_id {
        conn.execute(
            "INSERT INTO south_migrationhistory (id, app_name, migration) VALUES (?1, 'v2', ?2)",
            rusqlite::params![id, format!("{id:04}_auto")],
        )
        .unwrap();
    }
}

/// Handle with the spatial stubs installed on every connection.
pub fn open_handle(path: impl Into<PathBuf>) -> SchemaDatabase {
    SchemaDatabase::with_config(path, DatabaseConfig::default().with_on_connect(spatial_stubs))
}

pub fn legacy_handle(dir: &Path, south_id: i64, file_version: u32) -> SchemaDatabase {
    let path = dir.join("model.sqlite");
    create_legacy_database(&path, south_id, file_version);
    open_handle(path)
}

pub fn table_names(conn: &Connection, kind: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
        .unwrap();
    stmt.query_map([kind], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

pub fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
    stmt.query_map([], |row| row.get(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

pub fn registered_views(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT view_name FROM views_geometry_columns ORDER BY view_name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}
