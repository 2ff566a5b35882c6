mod common;

use common::{legacy_handle, open_handle, registered_views, table_names};
use hydroschema_core::{
    ModelSchema, SchemaError, SchemaVersion, SchemaWarning, TranslateOutcome, UpgradeOptions,
    VectorTranslator,
};
use rusqlite::Connection;
use std::path::Path;

/// Copies the file and drops the SpatiaLite catalog, like a GeoPackage
/// writer would, then reports the configured stderr.
struct CopyTranslator {
    exit_ok: bool,
    stderr: &'static str,
}

impl VectorTranslator for CopyTranslator {
    fn translate(&self, source: &Path, destination: &Path) -> TranslateOutcome {
        std::fs::copy(source, destination).unwrap();
        let conn = Connection::open(destination).unwrap();
        conn.execute_batch("DROP TABLE IF EXISTS geometry_columns;")
            .unwrap();
        TranslateOutcome::classify(self.exit_ok, self.stderr)
    }
}

struct UnreachableTranslator;

impl VectorTranslator for UnreachableTranslator {
    fn translate(&self, _source: &Path, _destination: &Path) -> TranslateOutcome {
        panic!("translator must not run");
    }
}

const SEQUENCE_DIAGNOSTIC: &str = "ERROR 1: sqlite3_exec(CREATE TABLE \"sqlite_sequence\" (name,seq)) failed: object name reserved for internal use: sqlite_sequence";

#[test]
fn conversion_repoints_handle_to_geopackage() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = legacy_handle(dir.path(), 174, 4);
    let source = db.path().to_path_buf();

    let report = ModelSchema::new(&mut db)
        .with_translator(Box::new(CopyTranslator {
            exit_ok: true,
            stderr: SEQUENCE_DIAGNOSTIC,
        }))
        .upgrade(&UpgradeOptions::default().convert_to_geopackage(true))
        .unwrap();

    assert!(report.warnings.is_empty());
    assert!(db.is_geopackage());
    assert_eq!(db.path(), dir.path().join("model.gpkg"));

    let mut schema = ModelSchema::new(&mut db);
    assert_eq!(schema.get_version().unwrap(), Some(SchemaVersion::new(300)));
    let conn = schema.database().connection().unwrap();
    assert_eq!(
        registered_views(conn),
        vec!["v2_cross_section_location_view", "v2_manhole_view"]
    );

    let original = Connection::open(&source).unwrap();
    let catalog = table_names(&original, "table");
    assert!(catalog.contains(&"spatialite_history".to_string()));
    assert!(catalog.contains(&"views_geometry_columns".to_string()));
}

#[test]
fn translator_warnings_are_returned_to_the_caller() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = legacy_handle(dir.path(), 174, 4);
    let mut schema = ModelSchema::new(&mut db).with_translator(Box::new(CopyTranslator {
        exit_ok: true,
        stderr: "Warning 1: layer v2_channel has no features\n",
    }));
    schema.upgrade(&UpgradeOptions::default()).unwrap();

    let warnings = schema.convert_to_geopackage().unwrap();

    assert_eq!(
        warnings,
        vec![SchemaWarning::Translator {
            message: "Warning 1: layer v2_channel has no features".to_string(),
        }]
    );
}

#[test]
fn translator_failure_keeps_the_spatialite_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = legacy_handle(dir.path(), 174, 4);
    let mut schema = ModelSchema::new(&mut db).with_translator(Box::new(CopyTranslator {
        exit_ok: false,
        stderr: "ERROR 4: unable to open datasource",
    }));

    let err = schema.convert_to_geopackage().unwrap_err();

    match err {
        SchemaError::ConversionFailed(message) => {
            assert!(message.contains("unable to open datasource"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!schema.database().is_geopackage());
    assert_eq!(schema.get_version().unwrap(), Some(SchemaVersion::new(300)));
}

#[test]
fn failed_conversion_leaves_the_spatialite_file_upgradable() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = legacy_handle(dir.path(), 174, 4);
    let mut schema = ModelSchema::new(&mut db).with_translator(Box::new(CopyTranslator {
        exit_ok: false,
        stderr: "ERROR 4: unable to open datasource",
    }));
    schema.upgrade(&UpgradeOptions::default()).unwrap();
    assert!(schema.convert_to_geopackage().is_err());

    let report = schema.upgrade(&UpgradeOptions::default()).unwrap();
    assert_eq!(report.steps_applied, 0);
    schema.set_views().unwrap();

    let conn = schema.database().connection().unwrap();
    assert!(table_names(conn, "table").contains(&"spatialite_history".to_string()));
    assert_eq!(
        registered_views(conn),
        vec!["v2_cross_section_location_view", "v2_manhole_view"]
    );
}

#[test]
fn conversion_is_a_no_op_for_geopackage_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.gpkg");
    Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY NOT NULL);")
        .unwrap();
    let mut db = open_handle(&path);

    let warnings = ModelSchema::new(&mut db)
        .with_translator(Box::new(UnreachableTranslator))
        .convert_to_geopackage()
        .unwrap();

    assert!(warnings.is_empty());
    assert_eq!(db.path(), path);
}
