//! Copy-based file transactions.
//!
//! SQLite only partially supports transactional DDL, so rewrites that must not
//! corrupt the user's file run against a copy inside a temporary directory.
//! Committing swaps the copy over the original with a rename; dropping an
//! uncommitted transaction discards the copy.

use super::{DbResult, SchemaDatabase};
use log::{debug, info};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};
use uuid::Uuid;

/// Work copy of a database file living in its own temporary directory.
///
/// The directory is removed when the transaction is dropped, committed or not.
pub struct FileTransaction {
    target: PathBuf,
    work: SchemaDatabase,
    _dir: TempDir,
}

impl FileTransaction {
    /// Starts a transaction for `db`.
    ///
    /// With `start_empty` the work file starts as a blank database instead of
    /// a copy of the original. The original handle's connection is closed.
    pub fn begin(db: &mut SchemaDatabase, start_empty: bool) -> DbResult<Self> {
        db.close();
        let dir = tempfile::tempdir()?;
        let file_name = match db.path().extension() {
            Some(ext) => format!("work-{}.{}", Uuid::new_v4(), ext.to_string_lossy()),
            None => format!("work-{}", Uuid::new_v4()),
        };
        let work_path = dir.path().join(file_name);
        if !start_empty {
            fs::copy(db.path(), &work_path)?;
        }
        debug!(
            "event=file_tx_begin module=db status=ok start_empty={} work={}",
            start_empty,
            work_path.display()
        );

        Ok(Self {
            target: db.path().to_path_buf(),
            work: SchemaDatabase::with_config(work_path, db.config().clone()),
            _dir: dir,
        })
    }

    /// Handle to the work copy.
    pub fn database(&mut self) -> &mut SchemaDatabase {
        &mut self.work
    }

    /// Atomically replaces the original file with the work copy.
    ///
    /// `db` must be the handle the transaction was started from; its cached
    /// connection is closed so it reopens the new file on next use.
    pub fn commit(mut self, db: &mut SchemaDatabase) -> DbResult<()> {
        self.work.close();
        db.close();

        let mut staged = NamedTempFile::new_in(db.base_path())?;
        let mut source = File::open(self.work.path())?;
        io::copy(&mut source, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        if let Ok(metadata) = fs::metadata(&self.target) {
            fs::set_permissions(staged.path(), metadata.permissions())?;
        }
        staged.persist(&self.target).map_err(|err| err.error)?;

        info!(
            "event=file_tx_commit module=db status=ok target={}",
            self.target.display()
        );
        Ok(())
    }
}
