use crate::config::AppConfig;
use crate::dedupe::{self, DuplicateStats};
use crate::error::{Error, Result};
use crate::indexer::{self, IndexResult};
use crate::metadata::{self, MetadataReader, MetadataResult, TagReader};
use crate::migrator::{self, MigrationMode, MigrationResult};
use crate::progress::{CancelToken, ProgressReporter, Stage};
use crate::storage::models::{CatalogStatistics, DuplicateGroupView, MigrationStatusReport};
use crate::storage::Database;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Entry point for the batch stages.
///
/// Every call opens its own catalog connection. At most one invocation of each
/// stage runs at a time; a second one fails with [`Error::StageBusy`].
pub struct Pipeline {
    config: AppConfig,
    db_path: String,
    running: [AtomicBool; 4],
}

/// Holds a stage's running flag and clears it on drop.
struct StageGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let db_path = config.database.path.clone();
        Self {
            config,
            db_path,
            running: Default::default(),
        }
    }

    pub fn with_db_path(mut self, path: &str) -> Self {
        self.db_path = path.to_string();
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub fn is_running(&self, stage: Stage) -> bool {
        self.running[stage.slot()].load(Ordering::Acquire)
    }

    fn enter(&self, stage: Stage) -> Result<StageGuard<'_>> {
        let flag = &self.running[stage.slot()];
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected start of {}: already running", stage);
            return Err(Error::StageBusy(stage));
        }
        Ok(StageGuard { flag })
    }

    fn open(&self) -> Result<Database> {
        Ok(Database::open(&self.db_path)?)
    }

    pub fn index_directory(
        &self,
        root: &Path,
        resume: bool,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<IndexResult> {
        let _guard = self.enter(Stage::Index)?;
        let db = self.open()?;
        indexer::index_directory(&db, &self.config, root, resume, reporter, cancel)
    }

    /// Metadata extraction with the lofty tag reader.
    pub fn extract_metadata(
        &self,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<MetadataResult> {
        self.extract_metadata_with(&TagReader, reporter, cancel)
    }

    pub fn extract_metadata_with(
        &self,
        reader: &dyn MetadataReader,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<MetadataResult> {
        let _guard = self.enter(Stage::Metadata)?;
        let db = self.open()?;
        metadata::extract_metadata(&db, &self.config, reader, reporter, cancel)
    }

    pub fn find_duplicates(
        &self,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<DuplicateStats> {
        let _guard = self.enter(Stage::Dedupe)?;
        let db = self.open()?;
        dedupe::find_duplicates(&db, &self.config, reporter, cancel)
    }

    pub fn migrate_library(
        &self,
        skip_duplicates: bool,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<MigrationResult> {
        self.run_migration(skip_duplicates, MigrationMode::Execute, reporter, cancel)
    }

    /// Same selection as [`Pipeline::migrate_library`], returning path mappings only.
    pub fn dry_run_migration(
        &self,
        skip_duplicates: bool,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<MigrationResult> {
        self.run_migration(skip_duplicates, MigrationMode::DryRun, reporter, cancel)
    }

    fn run_migration(
        &self,
        skip_duplicates: bool,
        mode: MigrationMode,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<MigrationResult> {
        let _guard = self.enter(Stage::Migration)?;
        let db = self.open()?;
        migrator::migrate_library(&db, &self.config, skip_duplicates, mode, reporter, cancel)
    }

    pub fn get_duplicate_groups(&self, limit: usize) -> Result<Vec<DuplicateGroupView>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(self.open()?.get_duplicate_groups(limit)?)
    }

    pub fn catalog_statistics(&self) -> Result<CatalogStatistics> {
        Ok(self.open()?.catalog_statistics()?)
    }

    pub fn migration_status(&self) -> Result<MigrationStatusReport> {
        Ok(self.open()?.migration_status()?)
    }

    /// Drop every catalog row. Refused while any stage is running.
    pub fn reset(&self) -> Result<()> {
        let guards = Stage::ALL
            .iter()
            .map(|stage| self.enter(*stage))
            .collect::<Result<Vec<_>>>()?;
        self.open()?.truncate_all()?;
        info!("Catalog reset");
        drop(guards);
        Ok(())
    }
}
