//! Upgrade orchestration over one database handle.
//!
//! # Responsibility
//! - Resolve the installed revision and validate it against the chain.
//! - Run upgrades and downgrades, optionally inside a file transaction.
//! - Trigger post-steps: views, spatial indexes, SpatiaLite file upgrade and
//!   GeoPackage conversion.
//!
//! # Invariants
//! - All precondition checks run before the database is written.
//! - With `backup` enabled the original file is untouched unless every
//!   migration step succeeded.
//! - Views and spatial indexes are only (re)built at the chain head.

mod error;

pub use error::{SchemaError, SchemaResult, SchemaWarning};

use crate::convert::{Ogr2Ogr, TranslateOutcome, VectorTranslator};
use crate::db::migrations::{
    apply_downgrade, apply_upgrade, builtin_chain, current_version, MigrationChain,
    LATEST_LEGACY_MIGRATION_ID,
};
use crate::db::{FileTransaction, SchemaDatabase};
use crate::model::tables::{TableDescriptor, DECLARED_MODELS};
use crate::model::version::{SchemaVersion, TargetRevision};
use crate::spatial::{
    copy_models, ensure_spatial_indexes, recreate_views, spatialite_version, SpatialFlavor,
    ALL_VIEWS, VIEWS_TO_DELETE,
};
use log::{info, warn};
use serde::Serialize;
use std::time::Instant;

const GEOMETRY_VIEWS_TABLE_SQL: &str = "CREATE TABLE views_geometry_columns (
    view_name TEXT,
    view_geometry TEXT,
    view_rowid TEXT,
    f_table_name VARCHAR(256),
    f_geometry_column VARCHAR(256)
)";

/// Options accepted by [`ModelSchema::upgrade`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOptions {
    pub target: TargetRevision,
    /// Migrate a temporary copy and swap it in on success.
    ///
    /// Without backup a failing step may leave the file partially migrated.
    pub backup: bool,
    /// Recreate views after the upgrade; requires the head target.
    pub set_views: bool,
    pub upgrade_spatialite_version: bool,
    pub convert_to_geopackage: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            target: TargetRevision::Latest,
            backup: true,
            set_views: true,
            upgrade_spatialite_version: false,
            convert_to_geopackage: false,
        }
    }
}

impl UpgradeOptions {
    pub fn to_revision(mut self, target: impl Into<TargetRevision>) -> Self {
        self.target = target.into();
        self
    }

    pub fn backup(mut self, enabled: bool) -> Self {
        self.backup = enabled;
        self
    }

    pub fn set_views(mut self, enabled: bool) -> Self {
        self.set_views = enabled;
        self
    }

    pub fn upgrade_spatialite_version(mut self, enabled: bool) -> Self {
        self.upgrade_spatialite_version = enabled;
        self
    }

    pub fn convert_to_geopackage(mut self, enabled: bool) -> Self {
        self.convert_to_geopackage = enabled;
        self
    }
}

/// Summary of a finished upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    pub previous: Option<SchemaVersion>,
    pub current: SchemaVersion,
    pub steps_applied: usize,
    pub warnings: Vec<SchemaWarning>,
}

/// Schema manager bound to one database handle.
pub struct ModelSchema<'db> {
    db: &'db mut SchemaDatabase,
    chain: MigrationChain,
    models: &'static [TableDescriptor],
    translator: Box<dyn VectorTranslator>,
}

impl<'db> ModelSchema<'db> {
    /// Uses the built-in chain, declared models and `ogr2ogr`.
    pub fn new(db: &'db mut SchemaDatabase) -> Self {
        Self {
            db,
            chain: builtin_chain(),
            models: DECLARED_MODELS,
            translator: Box::new(Ogr2Ogr::from_env()),
        }
    }

    pub fn with_chain(mut self, chain: MigrationChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_models(mut self, models: &'static [TableDescriptor]) -> Self {
        self.models = models;
        self
    }

    pub fn with_translator(mut self, translator: Box<dyn VectorTranslator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn database(&mut self) -> &mut SchemaDatabase {
        &mut *self.db
    }

    pub fn chain(&self) -> &MigrationChain {
        &self.chain
    }

    /// Head revision of the injected chain.
    pub fn schema_version(&self) -> SchemaVersion {
        self.chain.head().revision
    }

    /// Installed revision, or `None` for an unversioned database.
    pub fn get_version(&mut self) -> SchemaResult<Option<SchemaVersion>> {
        Ok(current_version(self.db.connection()?)?)
    }

    /// Number of steps an upgrade to `target` would apply right now.
    pub fn upgrade_steps_count(&mut self, target: Option<TargetRevision>) -> SchemaResult<usize> {
        let current = self.get_version()?;
        let head = self.schema_version();
        Ok(self
            .chain
            .upgrade_steps_count(current, target.map(|target| target.resolve(head))))
    }

    pub fn upgrade(&mut self, options: &UpgradeOptions) -> SchemaResult<UpgradeReport> {
        self.upgrade_with_progress(options, &mut |_| {})
    }

    /// Upgrades the database; `progress` receives the completed fraction
    /// (`0.0..1.0`) before each migration step.
    pub fn upgrade_with_progress(
        &mut self,
        options: &UpgradeOptions,
        progress: &mut dyn FnMut(f64),
    ) -> SchemaResult<UpgradeReport> {
        let started_at = Instant::now();
        if (options.upgrade_spatialite_version || options.convert_to_geopackage)
            && !options.set_views
        {
            return Err(SchemaError::Configuration(
                "cannot upgrade the spatialite version or convert to geopackage without setting the views"
                    .to_string(),
            ));
        }

        let previous = self.get_version()?;
        if let Some(current) = previous {
            if current < LATEST_LEGACY_MIGRATION_ID {
                return Err(SchemaError::MigrationGap {
                    current,
                    minimum: LATEST_LEGACY_MIGRATION_ID,
                });
            }
        }

        let head = self.schema_version();
        let target = options.target.resolve(head);
        if options.set_views && target != head {
            return Err(SchemaError::Configuration(format!(
                "cannot set views when upgrading to version {target}"
            )));
        }

        let steps = self.chain.upgrade_path(previous, target)?;
        let steps_applied = steps.len();
        info!(
            "event=schema_upgrade module=schema status=start from={} to={} steps={} backup={}",
            version_label(previous),
            target,
            steps_applied,
            options.backup
        );

        if steps.is_empty() {
            info!("event=schema_upgrade module=schema status=skip reason=up_to_date");
        } else if options.backup {
            let mut tx = FileTransaction::begin(self.db, false)?;
            apply_upgrade(tx.database().connection()?, steps, progress)?;
            tx.commit(self.db)?;
        } else {
            apply_upgrade(self.db.connection()?, steps, progress)?;
        }

        let mut warnings = Vec::new();
        if options.upgrade_spatialite_version {
            // A rebuilt file already carries fresh views.
            if !self.upgrade_spatialite_version()? {
                self.set_views()?;
            }
        } else if options.convert_to_geopackage {
            warnings.extend(self.convert_to_geopackage()?);
        } else if options.set_views {
            self.set_views()?;
        }

        info!(
            "event=schema_upgrade module=schema status=ok from={} to={} steps={} duration_ms={}",
            version_label(previous),
            target,
            steps_applied,
            started_at.elapsed().as_millis()
        );
        Ok(UpgradeReport {
            previous,
            current: target,
            steps_applied,
            warnings,
        })
    }

    /// Reverts migrations down to `target`.
    ///
    /// Fails with `NotReversible` before writing anything if a step in the
    /// range has no downgrade action.
    pub fn downgrade(&mut self, target: SchemaVersion, backup: bool) -> SchemaResult<usize> {
        let head = self.schema_version();
        let current = self.get_version()?.ok_or(SchemaError::MigrationMissing {
            required: head,
            current: None,
        })?;
        let steps = self.chain.downgrade_path(current, target)?;
        let count = steps.len();
        if steps.is_empty() {
            return Ok(0);
        }
        if backup {
            let mut tx = FileTransaction::begin(self.db, false)?;
            apply_downgrade(tx.database().connection()?, &steps)?;
            tx.commit(self.db)?;
        } else {
            apply_downgrade(self.db.connection()?, &steps)?;
        }
        info!(
            "event=schema_downgrade module=schema status=ok from={} to={} steps={}",
            current, target, count
        );
        Ok(count)
    }

    /// Checks that the database is at (or beyond) the chain head.
    ///
    /// A database newer than the chain yields a `VersionAhead` warning.
    pub fn validate_schema(&mut self) -> SchemaResult<Vec<SchemaWarning>> {
        let version = self.get_version()?;
        let head = self.schema_version();
        match version {
            Some(version) if version > head => {
                let warning = SchemaWarning::VersionAhead {
                    database: version,
                    library: head,
                };
                warn!("event=schema_validate module=schema status=warn message={warning}");
                Ok(vec![warning])
            }
            Some(version) if version == head => Ok(Vec::new()),
            current => Err(SchemaError::MigrationMissing {
                required: head,
                current,
            }),
        }
    }

    /// Recreates the view catalogue according to the latest definitions.
    pub fn set_views(&mut self) -> SchemaResult<()> {
        self.require_head()?;
        let conn = self.db.connection()?;
        let version = spatialite_version(conn)?;
        recreate_views(conn, version.file, ALL_VIEWS, VIEWS_TO_DELETE)?;
        Ok(())
    }

    /// Creates missing spatial indexes; returns the `table.column` pairs indexed.
    pub fn set_spatial_indexes(&mut self) -> SchemaResult<Vec<String>> {
        self.require_head()?;
        let flavor = if self.db.is_geopackage() {
            SpatialFlavor::GeoPackage
        } else {
            SpatialFlavor::Spatialite
        };
        Ok(ensure_spatial_indexes(
            self.db.connection()?,
            flavor,
            self.models,
        )?)
    }

    /// Rebuilds a SpatiaLite 3 file in the layout of the loaded 4/5 library.
    ///
    /// A no-op for any other library/file combination. Returns whether the
    /// file was rebuilt.
    pub fn upgrade_spatialite_version(&mut self) -> SchemaResult<bool> {
        let version = spatialite_version(self.db.connection()?)?;
        if !version.is_upgradable() {
            info!(
                "event=spatialite_upgrade module=schema status=skip file_version={} library={}",
                version.file,
                version
                    .library
                    .map_or_else(|| "none".to_string(), |library| library.to_string())
            );
            return Ok(false);
        }
        self.validate_schema()?;

        let head = self.schema_version();
        let mut tx = FileTransaction::begin(self.db, true)?;
        {
            let conn = tx.database().connection()?;
            conn.query_row("SELECT InitSpatialMetadata(1)", [], |_| Ok(()))?;
            let steps = self.chain.upgrade_path(None, head)?;
            apply_upgrade(conn, steps, &mut |_| {})?;
            recreate_views(conn, 4, ALL_VIEWS, VIEWS_TO_DELETE)?;
        }
        copy_models(
            self.db.connection()?,
            tx.database().connection()?,
            self.models,
        )
        .map_err(SchemaError::from_copy)?;
        tx.commit(self.db)?;

        info!("event=spatialite_upgrade module=schema status=ok file_version=4");
        Ok(true)
    }

    /// Converts the SpatiaLite file into a `.gpkg` sibling and repoints the
    /// handle at it. A no-op for GeoPackage handles.
    pub fn convert_to_geopackage(&mut self) -> SchemaResult<Vec<SchemaWarning>> {
        if self.db.is_geopackage() {
            info!("event=gpkg_convert module=schema status=skip reason=already_geopackage");
            return Ok(Vec::new());
        }
        let started_at = Instant::now();
        self.upgrade(&UpgradeOptions::default())?;
        let mut warnings = self.validate_schema()?;

        // The catalog tables are dropped on a work copy so a failed
        // translation leaves the SpatiaLite file usable.
        let destination = self.db.path().with_extension("gpkg");
        let mut tx = FileTransaction::begin(self.db, false)?;
        let work = tx.database();
        work.connection()?.execute_batch(
            "DROP TABLE IF EXISTS spatialite_history;
             DROP TABLE IF EXISTS views_geometry_columns;",
        )?;
        work.close();

        let outcome = self.translator.translate(work.path(), &destination);
        drop(tx);
        let translator_warnings = match outcome {
            TranslateOutcome::Success { warnings } => warnings,
            TranslateOutcome::BenignWarning {
                diagnostic,
                warnings,
            } => {
                info!(
                    "event=gpkg_convert module=schema status=benign diagnostic={}",
                    diagnostic
                );
                warnings
            }
            TranslateOutcome::Failure { diagnostic } => {
                return Err(SchemaError::ConversionFailed(diagnostic));
            }
        };
        for message in translator_warnings {
            warn!("event=gpkg_convert module=schema status=warn message={message}");
            warnings.push(SchemaWarning::Translator { message });
        }

        self.db.set_path(destination);
        self.db.connection()?.execute_batch(GEOMETRY_VIEWS_TABLE_SQL)?;
        self.set_views()?;

        info!(
            "event=gpkg_convert module=schema status=ok path={} duration_ms={}",
            self.db.path().display(),
            started_at.elapsed().as_millis()
        );
        Ok(warnings)
    }

    fn require_head(&mut self) -> SchemaResult<()> {
        let version = self.get_version()?;
        let head = self.schema_version();
        if version == Some(head) {
            Ok(())
        } else {
            Err(SchemaError::MigrationMissing {
                required: head,
                current: version,
            })
        }
    }
}

fn version_label(version: Option<SchemaVersion>) -> String {
    version.map_or_else(|| "none".to_string(), |version| version.to_string())
}
