//! Vector format translation (SpatiaLite → GeoPackage).
//!
//! # Responsibility
//! - Run the external translation tool against a whole database file.
//! - Classify the tool's diagnostics into an explicit outcome.
//!
//! # Invariants
//! - The known `sqlite_sequence` diagnostic never fails a conversion.
//! - `Warning` lines are collected, never fatal.

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable overriding the `ogr2ogr` executable.
pub const OGR2OGR_ENV: &str = "OGR2OGR_PATH";

// ogr2ogr tries to copy SQLite's internal sequence table and reports an
// error even though every user table converted fine.
static BENIGN_SEQUENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^ERROR 1: sqlite3_exec\(CREATE TABLE "sqlite_sequence" \(.*\)\) failed: object name reserved for internal use: sqlite_sequence$"#,
    )
    .expect("valid benign diagnostic regex")
});
static WARNING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Warning \d+: ").expect("valid warning regex"));

/// Classified result of one translation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateOutcome {
    Success { warnings: Vec<String> },
    /// Only the known harmless diagnostic was reported.
    BenignWarning {
        diagnostic: String,
        warnings: Vec<String>,
    },
    Failure { diagnostic: String },
}

impl TranslateOutcome {
    /// Classifies tool output from its exit status and stderr text.
    pub fn classify(exit_ok: bool, stderr: &str) -> Self {
        let mut warnings = Vec::new();
        let mut benign = None;
        let mut errors = Vec::new();
        for line in stderr.lines().map(str::trim_end).filter(|line| !line.trim().is_empty()) {
            if BENIGN_SEQUENCE_RE.is_match(line) {
                benign = Some(line.to_string());
            } else if WARNING_RE.is_match(line) {
                warnings.push(line.to_string());
            } else {
                errors.push(line);
            }
        }

        if !errors.is_empty() {
            return Self::Failure {
                diagnostic: errors.join("\n"),
            };
        }
        match benign {
            Some(diagnostic) => Self::BenignWarning {
                diagnostic,
                warnings,
            },
            None if exit_ok => Self::Success { warnings },
            None => Self::Failure {
                diagnostic: "translator exited with a failure status and no diagnostic"
                    .to_string(),
            },
        }
    }
}

/// Converts a whole SQLite database file into a GeoPackage file.
pub trait VectorTranslator {
    fn translate(&self, source: &Path, destination: &Path) -> TranslateOutcome;
}

/// `ogr2ogr` subprocess translator.
#[derive(Debug, Clone)]
pub struct Ogr2Ogr {
    program: PathBuf,
}

impl Ogr2Ogr {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `OGR2OGR_PATH` when set, `ogr2ogr` from `PATH` otherwise.
    pub fn from_env() -> Self {
        match std::env::var_os(OGR2OGR_ENV).filter(|value| !value.is_empty()) {
            Some(program) => Self::new(program),
            None => Self::new("ogr2ogr"),
        }
    }

    fn command(&self, source: &Path, destination: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-f")
            .arg("gpkg")
            .arg(destination)
            .arg(source)
            .arg("-oo")
            .arg("LIST_ALL_TABLES=YES");
        command
    }
}

impl Default for Ogr2Ogr {
    fn default() -> Self {
        Self::from_env()
    }
}

impl VectorTranslator for Ogr2Ogr {
    fn translate(&self, source: &Path, destination: &Path) -> TranslateOutcome {
        debug!(
            "event=translate module=convert status=start program={} source={} destination={}",
            self.program.display(),
            source.display(),
            destination.display()
        );
        let output = match self.command(source, destination).output() {
            Ok(output) => output,
            Err(err) => {
                return TranslateOutcome::Failure {
                    diagnostic: format!("failed to run {}: {err}", self.program.display()),
                }
            }
        };
        let outcome =
            TranslateOutcome::classify(output.status.success(), &String::from_utf8_lossy(&output.stderr));
        info!(
            "event=translate module=convert status={} exit_code={}",
            match outcome {
                TranslateOutcome::Failure { .. } => "error",
                _ => "ok",
            },
            output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |code| code.to_string())
        );
        outcome
    }
}
