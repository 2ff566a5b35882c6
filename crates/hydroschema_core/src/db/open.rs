//! Database handle and connection bootstrap.
//!
//! # Responsibility
//! - Open SQLite connections lazily for one database file.
//! - Configure pragmas required by table-rebuilding migrations.
//! - Load SpatiaLite when a library path is configured.
//!
//! # Invariants
//! - Returned connections have `legacy_alter_table=ON`.
//! - GeoPackage files run in SpatiaLite amphibious mode when the extension is loaded.

use super::{DbError, DbResult};
use log::{debug, error, info, warn};
use rusqlite::{Connection, LoadExtensionGuard, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Environment variable naming the SpatiaLite module to load.
pub const SPATIALITE_LIBRARY_ENV: &str = "SPATIALITE_LIBRARY_PATH";

/// Module name resolved through the platform library search path.
pub const DEFAULT_SPATIALITE_LIBRARY: &str = "mod_spatialite";

const GEOPACKAGE_EXTENSION: &str = "gpkg";

/// Hook executed on every freshly opened connection, after pragmas and
/// extension loading.
pub type ConnectHook = fn(&Connection) -> rusqlite::Result<()>;

/// Connection settings shared by a handle and its file-transaction copies.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// SpatiaLite module path. `None` skips extension loading; the
    /// `Default` config has none.
    pub spatialite_library: Option<PathBuf>,
    pub on_connect: Option<ConnectHook>,
}

impl DatabaseConfig {
    /// Reads the SpatiaLite module path from `SPATIALITE_LIBRARY_PATH`,
    /// falling back to `mod_spatialite`.
    pub fn from_env() -> Self {
        let spatialite_library = std::env::var_os(SPATIALITE_LIBRARY_ENV)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_SPATIALITE_LIBRARY), PathBuf::from);
        Self {
            spatialite_library: Some(spatialite_library),
            on_connect: None,
        }
    }

    pub fn with_on_connect(mut self, hook: ConnectHook) -> Self {
        self.on_connect = Some(hook);
        self
    }
}

/// Handle to a single SpatiaLite or GeoPackage database file.
#[derive(Debug)]
pub struct SchemaDatabase {
    path: PathBuf,
    config: DatabaseConfig,
    conn: Option<Connection>,
}

impl SchemaDatabase {
    /// Creates a handle configured from the process environment.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, DatabaseConfig::from_env())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: DatabaseConfig) -> Self {
        Self {
            path: path.into(),
            config,
            conn: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Directory containing the database file.
    pub fn base_path(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Points the handle at another file and drops the cached connection.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.close();
        self.path = path.into();
    }

    pub fn is_geopackage(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(GEOPACKAGE_EXTENSION))
    }

    /// Returns the cached connection, opening it on first use.
    pub fn connection(&mut self) -> DbResult<&mut Connection> {
        if self.conn.is_none() {
            let conn = self.open_connection()?;
            self.conn = Some(conn);
        }
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(DbError::InvalidData("connection cache is empty".to_string())),
        }
    }

    /// Closes the cached connection, if any.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                warn!(
                    "event=db_close module=db status=error path={} error={}",
                    self.path.display(),
                    err
                );
            }
        }
    }

    pub fn has_table(&mut self, name: &str) -> DbResult<bool> {
        table_exists(self.connection()?, name)
    }

    /// Verifies that a connection can be established and queried.
    pub fn check_connection(&mut self) -> DbResult<()> {
        self.connection()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Runs `PRAGMA integrity_check`; call before touching an untrusted file.
    pub fn check_integrity(&mut self) -> DbResult<()> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("PRAGMA integrity_check")?;
        let problems = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|line| line != "ok")
            .collect::<Vec<_>>();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(DbError::InvalidData(format!(
                "integrity check failed: {}",
                problems.join("; ")
            )))
        }
    }

    fn open_connection(&self) -> DbResult<Connection> {
        let started_at = Instant::now();
        let mode = if self.is_geopackage() {
            "geopackage"
        } else {
            "spatialite"
        };
        debug!(
            "event=db_open module=db status=start mode={} path={}",
            mode,
            self.path.display()
        );

        let result = Connection::open(&self.path)
            .map_err(DbError::from)
            .and_then(|conn| self.bootstrap_connection(&conn).map(|()| conn));

        match result {
            Ok(conn) => {
                info!(
                    "event=db_open module=db status=ok mode={} duration_ms={}",
                    mode,
                    started_at.elapsed().as_millis()
                );
                Ok(conn)
            }
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={} duration_ms={} path={} error={}",
                    mode,
                    started_at.elapsed().as_millis(),
                    self.path.display(),
                    err
                );
                Err(err)
            }
        }
    }

    fn bootstrap_connection(&self, conn: &Connection) -> DbResult<()> {
        // Forces SQLite to read the header so non-database files fail here.
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "legacy_alter_table", true)?;
        conn.pragma_update(None, "cell_size_check", true)?;
        // Returns the applied size on most builds; the row is ignored.
        conn.prepare("PRAGMA mmap_size = 0")?.query([])?.next()?;

        if let Some(library) = &self.config.spatialite_library {
            load_spatialite(conn, library)?;
            if self.is_geopackage() {
                conn.query_row("SELECT AutoGpkgStart()", [], |_| Ok(()))?;
                conn.query_row("SELECT EnableGpkgAmphibiousMode()", [], |_| Ok(()))?;
            }
        }

        if let Some(hook) = self.config.on_connect {
            hook(conn)?;
        }
        Ok(())
    }
}

impl Drop for SchemaDatabase {
    fn drop(&mut self) {
        self.close();
    }
}

fn load_spatialite(conn: &Connection, library: &Path) -> DbResult<()> {
    // SAFETY: the module path comes from process configuration, never from
    // database content, and extension loading is disabled again by the guard.
    unsafe {
        let _guard = LoadExtensionGuard::new(conn)?;
        conn.load_extension(library, None)?;
    }
    Ok(())
}

/// Returns whether a table (not a view) named `name` exists.
pub fn table_exists(conn: &Connection, name: &str) -> DbResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}
