mod naming;

pub use naming::{
    cap_path_length, resolve_collision, sanitize_component, sanitize_filename, target_path,
    TargetSlot, MAX_COMPONENT_LEN, MAX_PATH_LEN, UNKNOWN_ARTIST,
};

use crate::config::AppConfig;
use crate::error::Result;
use crate::hasher;
use crate::indexer::ERROR_SAMPLE_LIMIT;
use crate::progress::{CancelToken, ProgressCounters, ProgressReporter, ProgressUpdate, Stage};
use crate::storage::models::{CatalogEntry, FileStatus, MigrationRecord, MigrationStatus};
use crate::storage::Database;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    Execute,
    /// Compute target paths only; no file or catalog row is touched.
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathMapping {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationResult {
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub error_files: Vec<String>,
    /// Dry-run only, capped at `migration.preview_limit`.
    pub mappings: Vec<PathMapping>,
    pub stopped: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
enum FileMigrationError {
    #[error("source file does not exist")]
    SourceMissing,

    #[error("verification failed for {0}")]
    VerificationFailed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Copy `source` to `target` and carry over the modification time.
fn copy_preserving_mtime(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target)?;
    let modified = fs::metadata(source)?.modified()?;
    File::options().write(true).open(target)?.set_modified(modified)?;
    Ok(())
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

pub(crate) type Verifier = dyn Fn(&Path, &Path) -> bool;

/// Place one file at (or next to) `target`. Returns where it ended up.
fn migrate_file(
    source: &Path,
    target: &Path,
    verify: Option<&Verifier>,
) -> std::result::Result<PathBuf, FileMigrationError> {
    let source_meta = match fs::metadata(source) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FileMigrationError::SourceMissing)
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let destination = match resolve_collision(target, source_meta.len())? {
        TargetSlot::AlreadyPresent(path) => {
            info!("File already exists at target: {}", path.display());
            return Ok(path);
        }
        TargetSlot::Free(path) => path,
    };

    debug!("Copying {} to {}", source.display(), destination.display());
    if let Err(e) = copy_preserving_mtime(source, &destination) {
        remove_quietly(&destination);
        return Err(e.into());
    }

    if let Some(verify) = verify {
        if !verify(source, &destination) {
            remove_quietly(&destination);
            return Err(FileMigrationError::VerificationFailed(
                destination.display().to_string(),
            ));
        }
    }

    Ok(destination)
}

/// Copy eligible catalog entries into `target.base_path/<Artist>/<file name>`.
///
/// Entries with a completed migration record are skipped. In `Execute` mode each
/// success writes a completed record and moves the entry to `migrated`; a failure
/// writes a failed record and leaves the entry as it was, so the next run retries it.
/// Catalog writes are committed every `migration.commit_every` files.
pub fn migrate_library(
    db: &Database,
    config: &AppConfig,
    skip_duplicates: bool,
    mode: MigrationMode,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<MigrationResult> {
    let verify: Option<&Verifier> = if config.migration.verify {
        Some(&hasher::verify_copy)
    } else {
        None
    };
    migrate_library_with(db, config, skip_duplicates, mode, verify, reporter, cancel)
}

pub(crate) fn migrate_library_with(
    db: &Database,
    config: &AppConfig,
    skip_duplicates: bool,
    mode: MigrationMode,
    verify: Option<&Verifier>,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<MigrationResult> {
    let start = Instant::now();
    let dry_run = mode == MigrationMode::DryRun;
    let base = PathBuf::from(&config.target.base_path);
    let commit_every = config.migration.commit_every.max(1);

    info!(
        "Starting library migration to {} (dry_run={})",
        base.display(),
        dry_run
    );
    if !dry_run {
        fs::create_dir_all(&base)?;
    }

    let candidates: Vec<CatalogEntry> = db.migration_candidates(skip_duplicates)?;
    let total = candidates.len();
    info!(
        "Migrating {} files (skip_duplicates={})",
        total, skip_duplicates
    );
    reporter.on_stage_start(Stage::Migration, total);

    let mut result = MigrationResult::default();
    // Copies run with no transaction open; their records are written in groups.
    let mut pending: Vec<MigrationRecord> = Vec::with_capacity(commit_every);

    for (i, entry) in candidates.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Migration stopped");
            result.stopped = true;
            break;
        }

        if db.has_completed_migration(entry.id)? {
            result.skipped += 1;
        } else {
            let artist = db.get_metadata(entry.id)?.and_then(|m| m.artist);
            let source = Path::new(&entry.source_path);
            let target = target_path(&base, artist.as_deref(), source);

            if dry_run {
                if result.mappings.len() < config.migration.preview_limit {
                    result.mappings.push(PathMapping {
                        source: entry.source_path.clone(),
                        target: target.display().to_string(),
                    });
                }
                result.migrated += 1;
            } else {
                let started_at = chrono::Utc::now().to_rfc3339();

                match migrate_file(source, &target, verify) {
                    Ok(destination) => {
                        pending.push(MigrationRecord {
                            id: 0,
                            file_id: entry.id,
                            source_path: entry.source_path.clone(),
                            target_path: destination.display().to_string(),
                            status: MigrationStatus::Completed,
                            started_at,
                            completed_at: Some(chrono::Utc::now().to_rfc3339()),
                            error: None,
                        });
                        result.migrated += 1;
                    }
                    Err(e) => {
                        error!("Error migrating file {}: {}", entry.source_path, e);
                        pending.push(MigrationRecord {
                            id: 0,
                            file_id: entry.id,
                            source_path: entry.source_path.clone(),
                            target_path: target.display().to_string(),
                            status: MigrationStatus::Failed,
                            started_at,
                            completed_at: None,
                            error: Some(e.to_string()),
                        });
                        result.failed += 1;
                        if result.error_files.len() < ERROR_SAMPLE_LIMIT {
                            result.error_files.push(entry.source_path.clone());
                        }
                    }
                }

                if pending.len() >= commit_every {
                    write_records(db, &mut pending)?;
                }
            }
        }

        let processed = i + 1;
        reporter.on_progress(&ProgressUpdate {
            operation: Stage::Migration,
            progress: processed,
            total,
            message: format!("Migrating: {}/{}", processed, total),
            counters: ProgressCounters {
                added: result.migrated,
                skipped: result.skipped,
                failed: result.failed,
                groups: 0,
            },
        });
    }

    write_records(db, &mut pending)?;

    result.elapsed = start.elapsed();
    reporter.on_stage_complete(Stage::Migration, result.elapsed);
    info!(
        "Migration complete: {} migrated, {} skipped, {} failed",
        result.migrated, result.skipped, result.failed
    );
    Ok(result)
}

/// Upsert buffered records in one transaction and advance completed entries.
fn write_records(db: &Database, pending: &mut Vec<MigrationRecord>) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }

    let tx = db.connection().unchecked_transaction()?;
    for record in pending.iter() {
        db.record_migration(record)?;
        if record.status == MigrationStatus::Completed {
            db.advance_status(record.file_id, FileStatus::Migrated)?;
        }
    }
    tx.commit()?;
    debug!("Committed {} migration records", pending.len());
    pending.clear();
    Ok(())
}
