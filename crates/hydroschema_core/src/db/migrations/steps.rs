//! Built-in migration chain.
//!
//! The chain starts at 0200, the first revision after the legacy
//! `south_migrationhistory` era; files at legacy revision 174 or later
//! upgrade from the root.

use super::{Migration, MigrationAction, MigrationChain};
use crate::db::{table_exists, DbResult};
use crate::model::version::SchemaVersion;
use rusqlite::Connection;

const MIGRATIONS: &[Migration] = &[
    Migration {
        revision: SchemaVersion::new(200),
        down_revision: None,
        description: "initial model tables",
        upgrade: MigrationAction::Sql(include_str!("sql/0200_initial.sql")),
        downgrade: None,
    },
    Migration {
        revision: SchemaVersion::new(218),
        down_revision: Some(SchemaVersion::new(200)),
        description: "1d vegetation and variable friction",
        upgrade: MigrationAction::Sql(include_str!("sql/0218_vegetation_friction.sql")),
        downgrade: Some(MigrationAction::Sql(include_str!(
            "sql/0218_vegetation_friction_down.sql"
        ))),
    },
    Migration {
        revision: SchemaVersion::new(219),
        down_revision: Some(SchemaVersion::new(218)),
        description: "nullable cross section location friction value",
        upgrade: MigrationAction::Sql(include_str!("sql/0219_nullable_friction_value.sql")),
        downgrade: None,
    },
    Migration {
        revision: SchemaVersion::new(220),
        down_revision: Some(SchemaVersion::new(219)),
        description: "geopackage compatibility",
        upgrade: MigrationAction::Native(drop_connection_node_linestring),
        downgrade: Some(MigrationAction::Sql(
            "ALTER TABLE v2_connection_nodes ADD COLUMN the_geom_linestring LINESTRING;",
        )),
    },
    Migration {
        revision: SchemaVersion::new(300),
        down_revision: Some(SchemaVersion::new(220)),
        description: "settings tables",
        upgrade: MigrationAction::Sql(include_str!("sql/0300_settings_tables.sql")),
        downgrade: Some(MigrationAction::Sql(include_str!(
            "sql/0300_settings_tables_down.sql"
        ))),
    },
];

/// Returns the chain shipped with this crate.
pub fn builtin_chain() -> MigrationChain {
    MigrationChain::new(MIGRATIONS.to_vec()).expect("built-in migration chain is valid")
}

/// GeoPackage cannot hold two geometry columns per table.
fn drop_connection_node_linestring(conn: &Connection) -> DbResult<()> {
    const TABLE: &str = "v2_connection_nodes";
    const COLUMN: &str = "the_geom_linestring";

    conn.execute_batch("DROP VIEW IF EXISTS v2_manhole_view;")?;

    // SpatiaLite guards registered geometry columns with triggers; they must go
    // before the column can be dropped.
    let pattern = format!("%{COLUMN}%");
    let triggers = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'trigger' AND tbl_name = ?1 AND sql LIKE ?2",
        )?;
        let names = stmt
            .query_map([TABLE, pattern.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        names
    };
    for trigger in triggers {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS \"{trigger}\";"))?;
    }

    conn.execute_batch(&format!("ALTER TABLE {TABLE} DROP COLUMN {COLUMN};"))?;

    if table_exists(conn, "geometry_columns")? {
        conn.execute(
            "DELETE FROM geometry_columns WHERE f_table_name = ?1 AND f_geometry_column = ?2",
            [TABLE, COLUMN],
        )?;
        conn.query_row(
            "SELECT RecoverGeometryColumn(?1, 'the_geom', 4326, 'POINT', 'XY')",
            [TABLE],
            |_| Ok(()),
        )?;
    }
    Ok(())
}
