use super::models::*;
use super::sqlite::Database;
use ahash::AHashMap;
use rusqlite::{params, params_from_iter, OptionalExtension, Result, Row};
use tracing::debug;

const CATALOG_COLUMNS: &str =
    "id, source_path, file_size, modified_at, partial_hash, status, error_message";

fn catalog_entry_from_row(row: &Row<'_>) -> Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: row.get(0)?,
        source_path: row.get(1)?,
        file_size: row.get(2)?,
        modified_at: row.get(3)?,
        partial_hash: row.get(4)?,
        status: row.get(5)?,
        error_message: row.get(6)?,
    })
}

fn migration_record_from_row(row: &Row<'_>) -> Result<MigrationRecord> {
    Ok(MigrationRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        source_path: row.get(2)?,
        target_path: row.get(3)?,
        status: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        error: row.get(7)?,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl Database {
    // ── Catalog ──────────────────────────────────────────────────

    pub fn catalog_contains(&self, source_path: &str) -> Result<bool> {
        self.connection()
            .prepare_cached("SELECT 1 FROM catalog_file WHERE source_path = ?1")?
            .exists(params![source_path])
    }

    /// Insert a new entry and return its id. `entry.id` is ignored.
    pub fn insert_catalog_entry(&self, entry: &CatalogEntry) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection()
            .prepare_cached(
                "INSERT INTO catalog_file \
                 (source_path, file_size, modified_at, partial_hash, status, error_message, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?
            .execute(params![
                entry.source_path,
                entry.file_size,
                entry.modified_at,
                entry.partial_hash,
                entry.status,
                entry.error_message,
                now,
            ])?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_catalog_entry(&self, id: i64) -> Result<Option<CatalogEntry>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM catalog_file WHERE id = ?1", CATALOG_COLUMNS),
                params![id],
                catalog_entry_from_row,
            )
            .optional()
    }

    pub fn get_entry_by_path(&self, source_path: &str) -> Result<Option<CatalogEntry>> {
        self.connection()
            .query_row(
                &format!(
                    "SELECT {} FROM catalog_file WHERE source_path = ?1",
                    CATALOG_COLUMNS
                ),
                params![source_path],
                catalog_entry_from_row,
            )
            .optional()
    }

    /// Entries carrying a partial hash, in insertion order.
    pub fn hashed_entries(&self, min_file_size: i64) -> Result<Vec<CatalogEntry>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM catalog_file \
             WHERE partial_hash IS NOT NULL AND file_size >= ?1 ORDER BY id",
            CATALOG_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![min_file_size], catalog_entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn entries_with_status(&self, statuses: &[FileStatus]) -> Result<Vec<CatalogEntry>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM catalog_file WHERE status IN ({}) ORDER BY id",
            CATALOG_COLUMNS,
            placeholders(statuses.len())
        ))?;
        let entries = stmt
            .query_map(params_from_iter(statuses.iter()), catalog_entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// `indexed` entries that have no metadata row yet.
    pub fn entries_missing_metadata(&self) -> Result<Vec<CatalogEntry>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM catalog_file cf \
             WHERE cf.status = 'indexed' \
               AND NOT EXISTS (SELECT 1 FROM track_metadata tm WHERE tm.file_id = cf.id) \
             ORDER BY cf.id",
            CATALOG_COLUMNS
        ))?;
        let entries = stmt
            .query_map([], catalog_entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Entries eligible for migration: `indexed` or `analyzed`, and when
    /// `skip_duplicates` is set, not a non-primary member of a duplicate group.
    pub fn migration_candidates(&self, skip_duplicates: bool) -> Result<Vec<CatalogEntry>> {
        let duplicate_filter = if skip_duplicates {
            "AND NOT EXISTS (SELECT 1 FROM duplicate_member dm \
                             WHERE dm.file_id = cf.id AND dm.is_primary = 0)"
        } else {
            ""
        };
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM catalog_file cf \
             WHERE cf.status IN ('indexed', 'analyzed') {} ORDER BY cf.id",
            CATALOG_COLUMNS, duplicate_filter
        ))?;
        let entries = stmt
            .query_map([], catalog_entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Move an entry forward to `status`. Returns false when the entry is missing or
    /// already at or beyond it.
    pub fn advance_status(&self, file_id: i64, status: FileStatus) -> Result<bool> {
        let allowed = status.predecessors();
        if allowed.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "UPDATE catalog_file SET status = ? WHERE id = ? AND status IN ({})",
            placeholders(allowed.len())
        );
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&status, &file_id];
        values.extend(allowed.iter().map(|s| s as &dyn rusqlite::ToSql));
        let changed = self
            .connection()
            .execute(&sql, params_from_iter(values.into_iter()))?;
        Ok(changed > 0)
    }

    pub fn mark_error(&self, file_id: i64, message: &str) -> Result<bool> {
        let changed = self.connection().execute(
            "UPDATE catalog_file SET status = 'error', error_message = ?1 \
             WHERE id = ?2 AND status IN ('indexed', 'analyzed')",
            params![message, file_id],
        )?;
        Ok(changed > 0)
    }

    // ── Metadata ─────────────────────────────────────────────────

    pub fn upsert_metadata(&self, file_id: i64, metadata: &TrackMetadata) -> Result<()> {
        self.connection()
            .prepare_cached(
                "INSERT INTO track_metadata \
                 (file_id, artist, album, title, track_number, year, genre, \
                  duration_seconds, bitrate, sample_rate, format) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT(file_id) DO UPDATE SET \
                     artist = excluded.artist, \
                     album = excluded.album, \
                     title = excluded.title, \
                     track_number = excluded.track_number, \
                     year = excluded.year, \
                     genre = excluded.genre, \
                     duration_seconds = excluded.duration_seconds, \
                     bitrate = excluded.bitrate, \
                     sample_rate = excluded.sample_rate, \
                     format = excluded.format",
            )?
            .execute(params![
                file_id,
                metadata.artist,
                metadata.album,
                metadata.title,
                metadata.track_number,
                metadata.year,
                metadata.genre,
                metadata.duration_seconds,
                metadata.bitrate,
                metadata.sample_rate,
                metadata.format,
            ])?;
        Ok(())
    }

    pub fn get_metadata(&self, file_id: i64) -> Result<Option<TrackMetadata>> {
        self.connection()
            .query_row(
                "SELECT artist, album, title, track_number, year, genre, \
                        duration_seconds, bitrate, sample_rate, format \
                 FROM track_metadata WHERE file_id = ?1",
                params![file_id],
                |row| {
                    Ok(TrackMetadata {
                        artist: row.get(0)?,
                        album: row.get(1)?,
                        title: row.get(2)?,
                        track_number: row.get(3)?,
                        year: row.get(4)?,
                        genre: row.get(5)?,
                        duration_seconds: row.get(6)?,
                        bitrate: row.get(7)?,
                        sample_rate: row.get(8)?,
                        format: row.get(9)?,
                    })
                },
            )
            .optional()
    }

    /// All metadata rows keyed by file id.
    pub fn metadata_by_file(&self) -> Result<AHashMap<i64, TrackMetadata>> {
        let mut stmt = self.connection().prepare(
            "SELECT file_id, artist, album, title, track_number, year, genre, \
                    duration_seconds, bitrate, sample_rate, format FROM track_metadata",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    TrackMetadata {
                        artist: row.get(1)?,
                        album: row.get(2)?,
                        title: row.get(3)?,
                        track_number: row.get(4)?,
                        year: row.get(5)?,
                        genre: row.get(6)?,
                        duration_seconds: row.get(7)?,
                        bitrate: row.get(8)?,
                        sample_rate: row.get(9)?,
                        format: row.get(10)?,
                    },
                ))
            })?
            .collect::<Result<AHashMap<_, _>>>()?;
        Ok(rows)
    }

    // ── Duplicate Groups ─────────────────────────────────────────

    /// Atomically replace every membership row with `members`.
    pub fn replace_duplicate_groups(&self, members: &[DuplicateMember]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute("DELETE FROM duplicate_member", [])?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO duplicate_member \
                 (group_id, file_id, is_primary, quality_score, position) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for member in members {
                count += stmt.execute(params![
                    member.group_id,
                    member.file_id,
                    member.is_primary,
                    member.quality_score,
                    member.position,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Replaced duplicate membership with {} rows", count);
        Ok(count)
    }

    pub fn get_duplicate_members(&self) -> Result<Vec<DuplicateMember>> {
        let mut stmt = self.connection().prepare(
            "SELECT group_id, file_id, is_primary, quality_score, position \
             FROM duplicate_member ORDER BY id",
        )?;
        let members = stmt
            .query_map([], |row| {
                Ok(DuplicateMember {
                    group_id: row.get(0)?,
                    file_id: row.get(1)?,
                    is_primary: row.get(2)?,
                    quality_score: row.get(3)?,
                    position: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(members)
    }

    /// Up to `limit` groups, each with members ordered primary first.
    pub fn get_duplicate_groups(&self, limit: i64) -> Result<Vec<DuplicateGroupView>> {
        let mut group_stmt = self.connection().prepare(
            "SELECT group_id FROM duplicate_member \
             GROUP BY group_id ORDER BY MIN(id) LIMIT ?1",
        )?;
        let group_ids = group_stmt
            .query_map(params![limit], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>>>()?;

        let mut member_stmt = self.connection().prepare(
            "SELECT cf.id, cf.source_path, cf.file_size, dm.is_primary, dm.quality_score, \
                    tm.artist, tm.title, tm.bitrate, tm.format \
             FROM duplicate_member dm \
             JOIN catalog_file cf ON cf.id = dm.file_id \
             LEFT JOIN track_metadata tm ON tm.file_id = dm.file_id \
             WHERE dm.group_id = ?1 \
             ORDER BY dm.position",
        )?;

        let mut groups = Vec::with_capacity(group_ids.len());
        for group_id in group_ids {
            let members = member_stmt
                .query_map(params![group_id], |row| {
                    Ok(DuplicateMemberView {
                        file_id: row.get(0)?,
                        path: row.get(1)?,
                        size: row.get(2)?,
                        is_primary: row.get(3)?,
                        quality_score: row.get(4)?,
                        artist: row.get(5)?,
                        title: row.get(6)?,
                        bitrate: row.get(7)?,
                        format: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>>>()?;
            groups.push(DuplicateGroupView { group_id, members });
        }
        Ok(groups)
    }

    // ── Migration Records ────────────────────────────────────────

    pub fn has_completed_migration(&self, file_id: i64) -> Result<bool> {
        self.connection()
            .prepare_cached(
                "SELECT 1 FROM migration_record WHERE file_id = ?1 AND status = 'completed'",
            )?
            .exists(params![file_id])
    }

    /// Insert or overwrite the single record kept per catalog entry.
    pub fn record_migration(&self, record: &MigrationRecord) -> Result<()> {
        self.connection()
            .prepare_cached(
                "INSERT INTO migration_record \
                 (file_id, source_path, target_path, status, started_at, completed_at, error) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(file_id) DO UPDATE SET \
                     source_path = excluded.source_path, \
                     target_path = excluded.target_path, \
                     status = excluded.status, \
                     started_at = excluded.started_at, \
                     completed_at = excluded.completed_at, \
                     error = excluded.error",
            )?
            .execute(params![
                record.file_id,
                record.source_path,
                record.target_path,
                record.status,
                record.started_at,
                record.completed_at,
                record.error,
            ])?;
        Ok(())
    }

    pub fn get_migration_record(&self, file_id: i64) -> Result<Option<MigrationRecord>> {
        self.connection()
            .query_row(
                "SELECT id, file_id, source_path, target_path, status, started_at, \
                        completed_at, error \
                 FROM migration_record WHERE file_id = ?1",
                params![file_id],
                migration_record_from_row,
            )
            .optional()
    }

    // ── Checkpoints ──────────────────────────────────────────────

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let paths_json = serde_json::to_string(&checkpoint.processed_paths)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.connection().execute(
            "INSERT INTO checkpoint \
             (operation, job_key, progress, total, processed_paths, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
             ON CONFLICT(operation, job_key) DO UPDATE SET \
                 progress = excluded.progress, \
                 total = excluded.total, \
                 processed_paths = excluded.processed_paths, \
                 updated_at = excluded.updated_at",
            params![
                checkpoint.operation,
                checkpoint.job_key,
                checkpoint.progress as i64,
                checkpoint.total as i64,
                paths_json,
                now,
            ],
        )?;
        debug!(
            "Checkpoint saved: {} {} - {}/{}",
            checkpoint.operation, checkpoint.job_key, checkpoint.progress, checkpoint.total
        );
        Ok(())
    }

    pub fn load_checkpoint(&self, operation: &str, job_key: &str) -> Result<Option<Checkpoint>> {
        let row: Option<(i64, i64, String)> = self
            .connection()
            .query_row(
                "SELECT progress, total, processed_paths FROM checkpoint \
                 WHERE operation = ?1 AND job_key = ?2",
                params![operation, job_key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(progress, total, paths_json)| -> Result<Checkpoint> {
            let processed_paths: Vec<String> = serde_json::from_str(&paths_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(Checkpoint {
                operation: operation.to_string(),
                job_key: job_key.to_string(),
                progress: progress as usize,
                total: total as usize,
                processed_paths,
            })
        })
        .transpose()
    }

    pub fn clear_checkpoint(&self, operation: &str, job_key: &str) -> Result<bool> {
        let deleted = self.connection().execute(
            "DELETE FROM checkpoint WHERE operation = ?1 AND job_key = ?2",
            params![operation, job_key],
        )?;
        Ok(deleted > 0)
    }

    // ── Reporting ────────────────────────────────────────────────

    pub fn catalog_statistics(&self) -> Result<CatalogStatistics> {
        let (total_files, total_bytes): (i64, i64) = self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(file_size), 0) FROM catalog_file",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let mut stmt = self.connection().prepare(
            "SELECT status, COUNT(*) FROM catalog_file GROUP BY status ORDER BY status",
        )?;
        let status_counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(CatalogStatistics {
            total_files,
            total_bytes,
            status_counts,
        })
    }

    pub fn migration_status(&self) -> Result<MigrationStatusReport> {
        let total_files: i64 =
            self.connection()
                .query_row("SELECT COUNT(*) FROM catalog_file", [], |row| row.get(0))?;
        let migrated_files: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM migration_record WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?;
        let mut stmt = self.connection().prepare(
            "SELECT id, file_id, source_path, target_path, status, started_at, \
                    completed_at, error \
             FROM migration_record WHERE status = 'completed' \
             ORDER BY completed_at DESC, id DESC LIMIT 10",
        )?;
        let recent_migrations = stmt
            .query_map([], migration_record_from_row)?
            .collect::<Result<Vec<_>>>()?;

        let progress_percentage = if total_files > 0 {
            migrated_files as f64 / total_files as f64 * 100.0
        } else {
            0.0
        };
        Ok(MigrationStatusReport {
            total_files,
            migrated_files,
            progress_percentage,
            recent_migrations,
        })
    }
}
