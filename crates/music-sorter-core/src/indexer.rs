use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::hasher;
use crate::progress::{CancelToken, ProgressCounters, ProgressReporter, ProgressUpdate, Stage};
use crate::scanner::{self, LocalityWalker};
use crate::storage::models::{CatalogEntry, Checkpoint, FileStatus};
use crate::storage::Database;
use ahash::AHashSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::{debug, error, info};

/// Checkpoint operation name for indexing runs.
pub const INDEX_OPERATION: &str = "index";

/// Cap on the sample of failed paths returned to the caller.
pub const ERROR_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct IndexResult {
    pub files_added: usize,
    pub files_skipped: usize,
    pub errors: usize,
    /// First few paths that failed.
    pub error_files: Vec<String>,
    /// Paths visited by this run, whatever their outcome.
    pub total_processed: usize,
    pub total_estimated: usize,
    pub total_bytes_estimated: u64,
    /// Progress recorded by the checkpoint this run resumed from, 0 for a fresh run.
    pub resumed_from: usize,
    pub stopped: bool,
    pub elapsed: Duration,
    pub files_per_second: f64,
}

#[derive(Default)]
struct IndexCounters {
    processed: usize,
    added: usize,
    skipped: usize,
    errors: usize,
    error_files: Vec<String>,
}

impl IndexCounters {
    fn record_error(&mut self, path: String) {
        self.errors += 1;
        if self.error_files.len() < ERROR_SAMPLE_LIMIT {
            self.error_files.push(path);
        }
    }
}

/// Walk `root`, fingerprint every audio file not yet in the catalog and insert it.
///
/// Work is committed one batch per transaction. With `resume`, paths recorded in the
/// checkpoint for `root` are skipped without touching the disk. The checkpoint is
/// cleared once the walk runs to the end (or progress reaches the estimate) and is
/// persisted otherwise, so it only exists for unfinished runs.
pub fn index_directory(
    db: &Database,
    config: &AppConfig,
    root: &Path,
    resume: bool,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<IndexResult> {
    let start = Instant::now();

    if !root.exists() {
        return Err(Error::InvalidInput(format!(
            "Directory {} does not exist",
            root.display()
        )));
    }
    let root = fs::canonicalize(root)?;
    let job_key = root.to_string_lossy().into_owned();
    let ignore_patterns = &config.source.ignore_patterns;
    let checkpoints_enabled = config.checkpoint.enabled;
    let checkpoint_interval = Duration::from_secs(config.checkpoint.interval_secs);

    info!("Estimating file count in {}...", root.display());
    let (total, total_bytes) = scanner::estimate_count(&root, ignore_patterns);
    info!(
        "Found approximately {} audio files ({:.2} GB)",
        total,
        total_bytes as f64 / 1024.0 / 1024.0 / 1024.0
    );

    let mut processed_paths: AHashSet<String> = AHashSet::new();
    let mut resumed_from = 0;
    if resume && checkpoints_enabled {
        if let Some(checkpoint) = db.load_checkpoint(INDEX_OPERATION, &job_key)? {
            info!(
                "Resuming from checkpoint: {}/{} files already processed",
                checkpoint.progress, checkpoint.total
            );
            resumed_from = checkpoint.progress;
            processed_paths.extend(checkpoint.processed_paths);
        }
    }

    reporter.on_stage_start(Stage::Index, total);

    let mut counters = IndexCounters::default();
    let mut stopped = false;
    let mut last_checkpoint = Instant::now();
    let chunk_size = config.fingerprint.chunk_size_bytes;

    let walker = LocalityWalker::new(&root).with_ignore_patterns(ignore_patterns);
    for chunk in scanner::batch(walker, config.source.batch_size) {
        if cancel.is_cancelled() {
            stopped = true;
            break;
        }

        let mut batch_paths = Vec::with_capacity(chunk.len());
        let mut fresh = Vec::with_capacity(chunk.len());

        // Stat and hash with no transaction open; the store is only locked for the inserts.
        for path in chunk {
            if cancel.is_cancelled() {
                stopped = true;
                break;
            }

            let path_str = path.to_string_lossy().into_owned();
            counters.processed += 1;

            if processed_paths.contains(&path_str) {
                counters.skipped += 1;
                continue;
            }

            match fingerprint_file(db, &path, &path_str, chunk_size) {
                Ok(Some(entry)) => fresh.push(entry),
                Ok(None) => {
                    counters.skipped += 1;
                    batch_paths.push(path_str);
                }
                Err(e @ Error::Database(_)) => return Err(e),
                Err(e) => {
                    error!("Error indexing {}: {}", path.display(), e);
                    counters.record_error(path_str);
                }
            }
        }

        // The store failing ends the run; an unfinished batch rolls back.
        if !fresh.is_empty() {
            let tx = db.connection().unchecked_transaction()?;
            for entry in &fresh {
                db.insert_catalog_entry(entry)?;
            }
            tx.commit()?;
        }
        counters.added += fresh.len();
        batch_paths.extend(fresh.into_iter().map(|entry| entry.source_path));
        processed_paths.extend(batch_paths);
        debug!(
            "Committed batch: {} processed, {} added so far",
            counters.processed, counters.added
        );

        reporter.on_progress(&ProgressUpdate {
            operation: Stage::Index,
            progress: counters.processed,
            total,
            message: format!(
                "Processing: {} new, {} skipped, {} errors (Total: {}/{})",
                counters.added, counters.skipped, counters.errors, counters.processed, total
            ),
            counters: ProgressCounters {
                added: counters.added,
                skipped: counters.skipped,
                failed: counters.errors,
                groups: 0,
            },
        });

        if checkpoints_enabled && last_checkpoint.elapsed() >= checkpoint_interval {
            db.save_checkpoint(&snapshot(&job_key, &counters, total, &processed_paths))?;
            last_checkpoint = Instant::now();
        }

        if stopped {
            break;
        }
    }

    if stopped {
        info!("Indexing stopped by user");
    }

    if checkpoints_enabled {
        if !stopped || counters.processed >= total {
            db.clear_checkpoint(INDEX_OPERATION, &job_key)?;
        } else {
            db.save_checkpoint(&snapshot(&job_key, &counters, total, &processed_paths))?;
        }
    }

    let elapsed = start.elapsed();
    reporter.on_stage_complete(Stage::Index, elapsed);

    let elapsed_secs = elapsed.as_secs_f64();
    let files_per_second = if elapsed_secs > 0.0 {
        counters.processed as f64 / elapsed_secs
    } else {
        0.0
    };

    info!(
        "Indexing finished: {} added, {} skipped, {} errors in {:.2}s",
        counters.added, counters.skipped, counters.errors, elapsed_secs
    );

    Ok(IndexResult {
        files_added: counters.added,
        files_skipped: counters.skipped,
        errors: counters.errors,
        error_files: counters.error_files,
        total_processed: counters.processed,
        total_estimated: total,
        total_bytes_estimated: total_bytes,
        resumed_from,
        stopped,
        elapsed,
        files_per_second,
    })
}

/// Catalog row for a file not yet in the catalog, or `None` when it already is.
fn fingerprint_file(
    db: &Database,
    path: &Path,
    path_str: &str,
    chunk_size_bytes: u64,
) -> Result<Option<CatalogEntry>> {
    if db.catalog_contains(path_str)? {
        return Ok(None);
    }

    let metadata = fs::metadata(path)?;
    let modified_at = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let partial_hash = hasher::partial_hash(path, chunk_size_bytes);

    Ok(Some(CatalogEntry {
        id: 0,
        source_path: path_str.to_string(),
        file_size: metadata.len() as i64,
        modified_at,
        partial_hash,
        status: FileStatus::Indexed,
        error_message: None,
    }))
}

fn snapshot(
    job_key: &str,
    counters: &IndexCounters,
    total: usize,
    processed_paths: &AHashSet<String>,
) -> Checkpoint {
    let mut paths: Vec<String> = processed_paths.iter().cloned().collect();
    paths.sort();
    Checkpoint {
        operation: INDEX_OPERATION.to_string(),
        job_key: job_key.to_string(),
        progress: counters.processed,
        total,
        processed_paths: paths,
    }
}
