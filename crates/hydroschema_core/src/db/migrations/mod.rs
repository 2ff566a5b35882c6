//! Migration chain model and executor.
//!
//! # Responsibility
//! - Validate an explicitly constructed, ordered migration chain.
//! - Plan the steps between two revisions.
//! - Apply planned steps on one connection, recording each revision.
//!
//! # Invariants
//! - A chain has exactly one root and one head; revisions strictly increase.
//! - Every step references its predecessor through `down_revision`.
//! - Versions below the root (legacy revisions) upgrade from the root.

use crate::db::DbResult;
use crate::model::version::SchemaVersion;
use log::{debug, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub mod state;
mod steps;

pub use state::{
    current_version, LATEST_LEGACY_MIGRATION_ID, LEGACY_VERSION_TABLE_NAME, VERSION_TABLE_NAME,
};
pub use steps::builtin_chain;

/// Work performed by one direction of a migration step.
#[derive(Debug, Clone, Copy)]
pub enum MigrationAction {
    /// Batch of SQL statements that return no rows.
    Sql(&'static str),
    /// Step that needs queries or conditional logic.
    Native(fn(&Connection) -> DbResult<()>),
}

impl MigrationAction {
    fn run(self, conn: &Connection) -> DbResult<()> {
        match self {
            Self::Sql(sql) => conn.execute_batch(sql).map_err(Into::into),
            Self::Native(step) => step(conn),
        }
    }
}

/// One node in the migration chain.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub revision: SchemaVersion,
    /// Predecessor revision; `None` only for the root.
    pub down_revision: Option<SchemaVersion>,
    pub description: &'static str,
    pub upgrade: MigrationAction,
    pub downgrade: Option<MigrationAction>,
}

/// Error raised while building or planning over a migration chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Chain construction rejected the step list.
    Invalid(String),
    UnknownRevision(SchemaVersion),
    /// Requested upgrade target lies before the current revision.
    TargetBelowCurrent {
        current: SchemaVersion,
        target: SchemaVersion,
    },
    /// A step in the downgrade range has no downgrade action.
    NotReversible(SchemaVersion),
}

impl Display for ChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(message) => write!(f, "invalid migration chain: {message}"),
            Self::UnknownRevision(revision) => write!(f, "unknown schema revision {revision}"),
            Self::TargetBelowCurrent { current, target } => write!(
                f,
                "target revision {target} is below current revision {current}"
            ),
            Self::NotReversible(revision) => {
                write!(f, "migration {revision} cannot be downgraded")
            }
        }
    }
}

impl Error for ChainError {}

/// Explicit, validated list of migrations ordered from root to head.
#[derive(Debug, Clone)]
pub struct MigrationChain {
    steps: Vec<Migration>,
}

impl MigrationChain {
    pub fn new(steps: Vec<Migration>) -> Result<Self, ChainError> {
        let Some(root) = steps.first() else {
            return Err(ChainError::Invalid("chain has no steps".to_string()));
        };
        if let Some(parent) = root.down_revision {
            return Err(ChainError::Invalid(format!(
                "root {} references predecessor {parent}",
                root.revision
            )));
        }
        for pair in steps.windows(2) {
            let (previous, step) = (&pair[0], &pair[1]);
            if step.revision <= previous.revision {
                return Err(ChainError::Invalid(format!(
                    "revision {} does not increase after {}",
                    step.revision, previous.revision
                )));
            }
            if step.down_revision != Some(previous.revision) {
                return Err(ChainError::Invalid(format!(
                    "revision {} must follow {}",
                    step.revision, previous.revision
                )));
            }
        }
        Ok(Self { steps })
    }

    pub fn root(&self) -> &Migration {
        &self.steps[0]
    }

    pub fn head(&self) -> &Migration {
        &self.steps[self.steps.len() - 1]
    }

    pub fn steps(&self) -> &[Migration] {
        &self.steps
    }

    pub fn contains(&self, revision: SchemaVersion) -> bool {
        self.position(revision).is_some()
    }

    fn position(&self, revision: SchemaVersion) -> Option<usize> {
        self.steps
            .binary_search_by_key(&revision, |step| step.revision)
            .ok()
    }

    /// Index of the first step still to apply on top of `current`.
    fn start_index(&self, current: Option<SchemaVersion>) -> Result<usize, ChainError> {
        match current {
            None => Ok(0),
            Some(version) if version < self.root().revision => Ok(0),
            Some(version) => self
                .position(version)
                .map(|index| index + 1)
                .ok_or(ChainError::UnknownRevision(version)),
        }
    }

    /// Steps that bring `current` to `target`, in chain order.
    pub fn upgrade_path(
        &self,
        current: Option<SchemaVersion>,
        target: SchemaVersion,
    ) -> Result<&[Migration], ChainError> {
        let end = self
            .position(target)
            .ok_or(ChainError::UnknownRevision(target))?;
        let start = self.start_index(current)?;
        if start > end + 1 {
            if let Some(current) = current {
                return Err(ChainError::TargetBelowCurrent { current, target });
            }
        }
        Ok(&self.steps[start.min(end + 1)..=end])
    }

    /// Steps to revert from `current` down to `target`, head-most first.
    pub fn downgrade_path(
        &self,
        current: SchemaVersion,
        target: SchemaVersion,
    ) -> Result<Vec<&Migration>, ChainError> {
        let from = self
            .position(current)
            .ok_or(ChainError::UnknownRevision(current))?;
        let to = self
            .position(target)
            .ok_or(ChainError::UnknownRevision(target))?;
        if to > from {
            return Err(ChainError::Invalid(format!(
                "downgrade target {target} is above current revision {current}"
            )));
        }
        let steps = self.steps[to + 1..=from].iter().rev().collect::<Vec<_>>();
        if let Some(step) = steps.iter().find(|step| step.downgrade.is_none()) {
            return Err(ChainError::NotReversible(step.revision));
        }
        Ok(steps)
    }

    /// Number of steps an upgrade from `current` to `target` would apply.
    ///
    /// Unknown revisions and targets at or below `current` count as zero.
    pub fn upgrade_steps_count(
        &self,
        current: Option<SchemaVersion>,
        target: Option<SchemaVersion>,
    ) -> usize {
        let Some(target) = target else {
            return 0;
        };
        self.upgrade_path(current, target)
            .map(<[Migration]>::len)
            .unwrap_or(0)
    }
}

/// Applies `steps` in one transaction, reporting completed fraction before
/// each step.
pub fn apply_upgrade(
    conn: &mut Connection,
    steps: &[Migration],
    progress: &mut dyn FnMut(f64),
) -> DbResult<()> {
    let started_at = Instant::now();
    let total = steps.len();
    let tx = conn.transaction()?;
    for (index, step) in steps.iter().enumerate() {
        progress(index as f64 / total as f64);
        debug!(
            "event=migration_step module=migrations status=start direction=up revision={} description={}",
            step.revision, step.description
        );
        step.upgrade.run(&tx)?;
        state::write_version(&tx, Some(step.revision))?;
    }
    tx.commit()?;
    info!(
        "event=migration_apply module=migrations status=ok direction=up steps={} duration_ms={}",
        total,
        started_at.elapsed().as_millis()
    );
    Ok(())
}

/// Reverts `steps` (head-most first) in one transaction.
pub fn apply_downgrade(conn: &mut Connection, steps: &[&Migration]) -> DbResult<()> {
    let started_at = Instant::now();
    let tx = conn.transaction()?;
    for step in steps {
        debug!(
            "event=migration_step module=migrations status=start direction=down revision={}",
            step.revision
        );
        if let Some(action) = step.downgrade {
            action.run(&tx)?;
        }
        state::write_version(&tx, step.down_revision)?;
    }
    tx.commit()?;
    info!(
        "event=migration_apply module=migrations status=ok direction=down steps={} duration_ms={}",
        steps.len(),
        started_at.elapsed().as_millis()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ChainError, Migration, MigrationAction, MigrationChain};
    use crate::model::version::SchemaVersion;

    fn step(revision: u32, down: Option<u32>, reversible: bool) -> Migration {
        Migration {
            revision: SchemaVersion::new(revision),
            down_revision: down.map(SchemaVersion::new),
            description: "test step",
            upgrade: MigrationAction::Sql(""),
            downgrade: reversible.then_some(MigrationAction::Sql("")),
        }
    }

    fn chain() -> MigrationChain {
        MigrationChain::new(vec![
            step(200, None, true),
            step(201, Some(200), true),
            step(202, Some(201), false),
            step(203, Some(202), true),
        ])
        .unwrap()
    }

    fn revisions(steps: &[Migration]) -> Vec<u32> {
        steps.iter().map(|step| step.revision.get()).collect()
    }

    #[test]
    fn contains_only_chain_revisions() {
        let chain = chain();
        assert!(chain.contains(SchemaVersion::new(200)));
        assert!(chain.contains(SchemaVersion::new(203)));
        assert!(!chain.contains(SchemaVersion::new(174)));
        assert!(!chain.contains(SchemaVersion::new(204)));
    }

    #[test]
    fn new_rejects_broken_links() {
        let err = MigrationChain::new(vec![step(200, None, true), step(202, Some(201), true)])
            .unwrap_err();
        assert!(matches!(err, ChainError::Invalid(_)));
        assert!(matches!(
            MigrationChain::new(Vec::new()).unwrap_err(),
            ChainError::Invalid(_)
        ));
        assert!(matches!(
            MigrationChain::new(vec![step(200, Some(199), true)]).unwrap_err(),
            ChainError::Invalid(_)
        ));
    }

    #[test]
    fn upgrade_path_from_unversioned_and_legacy_starts_at_root() {
        let chain = chain();
        let target = SchemaVersion::new(203);
        assert_eq!(revisions(chain.upgrade_path(None, target).unwrap()), [200, 201, 202, 203]);
        assert_eq!(
            revisions(chain.upgrade_path(Some(SchemaVersion::new(174)), target).unwrap()),
            [200, 201, 202, 203]
        );
    }

    #[test]
    fn upgrade_path_at_target_is_empty() {
        let chain = chain();
        let head = SchemaVersion::new(203);
        assert!(chain.upgrade_path(Some(head), head).unwrap().is_empty());
        assert_eq!(
            revisions(chain.upgrade_path(Some(SchemaVersion::new(201)), head).unwrap()),
            [202, 203]
        );
    }

    #[test]
    fn upgrade_path_rejects_unknown_and_lower_targets() {
        let chain = chain();
        assert_eq!(
            chain.upgrade_path(None, SchemaVersion::new(250)).unwrap_err(),
            ChainError::UnknownRevision(SchemaVersion::new(250))
        );
        assert_eq!(
            chain
                .upgrade_path(Some(SchemaVersion::new(210)), SchemaVersion::new(203))
                .unwrap_err(),
            ChainError::UnknownRevision(SchemaVersion::new(210))
        );
        assert_eq!(
            chain
                .upgrade_path(Some(SchemaVersion::new(203)), SchemaVersion::new(201))
                .unwrap_err(),
            ChainError::TargetBelowCurrent {
                current: SchemaVersion::new(203),
                target: SchemaVersion::new(201),
            }
        );
    }

    #[test]
    fn downgrade_path_requires_reversible_steps() {
        let chain = chain();
        let steps = chain
            .downgrade_path(SchemaVersion::new(203), SchemaVersion::new(202))
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].revision, SchemaVersion::new(203));
        assert_eq!(
            chain
                .downgrade_path(SchemaVersion::new(203), SchemaVersion::new(200))
                .unwrap_err(),
            ChainError::NotReversible(SchemaVersion::new(202))
        );
    }

    #[test]
    fn upgrade_steps_count_matches_plan() {
        let chain = chain();
        let rev = |revision| Some(SchemaVersion::new(revision));
        assert_eq!(chain.upgrade_steps_count(rev(201), rev(203)), 2);
        assert_eq!(chain.upgrade_steps_count(rev(203), rev(200)), 0);
        assert_eq!(chain.upgrade_steps_count(None, None), 0);
        assert_eq!(chain.upgrade_steps_count(rev(174), rev(201)), 2);
    }
}
