//! Schema version bookkeeping.
//!
//! # Responsibility
//! - Read the applied revision from the version table.
//! - Fall back to the legacy `south_migrationhistory` table for old files.
//! - Record the revision after each applied step.
//!
//! # Invariants
//! - The version table holds at most one row.
//! - An empty or unversioned database resolves to `None`, never an error.

use crate::db::{table_exists, DbError, DbResult};
use crate::model::version::SchemaVersion;
use rusqlite::{Connection, OptionalExtension};

/// Table written by the migration chain.
pub const VERSION_TABLE_NAME: &str = "schema_version";
/// Table written by the pre-chain migration framework.
pub const LEGACY_VERSION_TABLE_NAME: &str = "south_migrationhistory";
/// Oldest legacy revision the chain can bridge.
pub const LATEST_LEGACY_MIGRATION_ID: SchemaVersion = SchemaVersion::new(174);

/// Resolves the revision of the database behind `conn`.
pub fn current_version(conn: &Connection) -> DbResult<Option<SchemaVersion>> {
    if let Some(version) = chain_version(conn)? {
        return Ok(Some(version));
    }
    legacy_version(conn)
}

fn chain_version(conn: &Connection) -> DbResult<Option<SchemaVersion>> {
    if !table_exists(conn, VERSION_TABLE_NAME)? {
        return Ok(None);
    }
    let raw = conn
        .query_row(
            &format!("SELECT version_num FROM {VERSION_TABLE_NAME} LIMIT 1"),
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(raw) => raw.parse::<SchemaVersion>().map(Some).map_err(|err| {
            DbError::InvalidData(format!(
                "{VERSION_TABLE_NAME}.version_num `{raw}` is not an integer revision: {err}"
            ))
        }),
    }
}

fn legacy_version(conn: &Connection) -> DbResult<Option<SchemaVersion>> {
    if !table_exists(conn, LEGACY_VERSION_TABLE_NAME)? {
        return Ok(None);
    }
    let id = conn.query_row(
        &format!("SELECT MAX(id) FROM {LEGACY_VERSION_TABLE_NAME}"),
        [],
        |row| row.get::<_, Option<i64>>(0),
    )?;
    match id {
        None => Ok(None),
        Some(id) => u32::try_from(id).map(|id| Some(SchemaVersion::new(id))).map_err(|_| {
            DbError::InvalidData(format!("{LEGACY_VERSION_TABLE_NAME}.id {id} is out of range"))
        }),
    }
}

/// Records `version` as the applied revision, or clears it for `None`.
pub(crate) fn write_version(conn: &Connection, version: Option<SchemaVersion>) -> DbResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {VERSION_TABLE_NAME} (
            version_num VARCHAR(32) NOT NULL,
            CONSTRAINT {VERSION_TABLE_NAME}_pkc PRIMARY KEY (version_num)
        );
        DELETE FROM {VERSION_TABLE_NAME};"
    ))?;
    if let Some(version) = version {
        conn.execute(
            &format!("INSERT INTO {VERSION_TABLE_NAME} (version_num) VALUES (?1)"),
            [version.to_string()],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{current_version, write_version, VERSION_TABLE_NAME};
    use crate::db::DbError;
    use crate::model::version::SchemaVersion;
    use rusqlite::Connection;

    #[test]
    fn empty_database_is_unversioned() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), None);
    }

    #[test]
    fn written_version_is_read_back() {
        let conn = Connection::open_in_memory().unwrap();
        write_version(&conn, Some(SchemaVersion::new(218))).unwrap();
        write_version(&conn, Some(SchemaVersion::new(219))).unwrap();

        let stored: String = conn
            .query_row(&format!("SELECT version_num FROM {VERSION_TABLE_NAME}"), [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored, "0219");
        assert_eq!(current_version(&conn).unwrap(), Some(SchemaVersion::new(219)));
    }

    #[test]
    fn empty_version_table_falls_back_to_legacy_history() {
        let conn = Connection::open_in_memory().unwrap();
        write_version(&conn, None).unwrap();
        conn.execute_batch(
            "CREATE TABLE south_migrationhistory (id INTEGER PRIMARY KEY, migration TEXT);
             INSERT INTO south_migrationhistory (id, migration) VALUES (173, 'a'), (174, 'b');",
        )
        .unwrap();
        assert_eq!(current_version(&conn).unwrap(), Some(SchemaVersion::new(174)));
    }

    #[test]
    fn empty_legacy_history_is_unversioned() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE south_migrationhistory (id INTEGER PRIMARY KEY);")
            .unwrap();
        assert_eq!(current_version(&conn).unwrap(), None);
    }

    #[test]
    fn non_numeric_revision_is_invalid_data() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version_num VARCHAR(32) NOT NULL);
             INSERT INTO schema_version VALUES ('abc123');",
        )
        .unwrap();
        assert!(matches!(current_version(&conn), Err(DbError::InvalidData(_))));
    }
}
