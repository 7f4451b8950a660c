use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a catalog entry: `indexed → analyzed → migrated`, or `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Indexed,
    Analyzed,
    Migrated,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Indexed => "indexed",
            FileStatus::Analyzed => "analyzed",
            FileStatus::Migrated => "migrated",
            FileStatus::Error => "error",
        }
    }

    /// Statuses a row may hold for a forward move to `self` to be allowed.
    pub fn predecessors(&self) -> &'static [FileStatus] {
        match self {
            FileStatus::Indexed => &[],
            FileStatus::Analyzed => &[FileStatus::Indexed],
            FileStatus::Migrated => &[FileStatus::Indexed, FileStatus::Analyzed],
            FileStatus::Error => &[FileStatus::Indexed, FileStatus::Analyzed],
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indexed" => Ok(FileStatus::Indexed),
            "analyzed" => Ok(FileStatus::Analyzed),
            "migrated" => Ok(FileStatus::Migrated),
            "error" => Ok(FileStatus::Error),
            other => Err(format!("unknown file status '{}'", other)),
        }
    }
}

impl ToSql for FileStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// One known source file.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: i64,
    pub source_path: String,
    pub file_size: i64,
    /// Unix seconds.
    pub modified_at: i64,
    pub partial_hash: Option<String>,
    pub status: FileStatus,
    pub error_message: Option<String>,
}

/// Tag and stream properties for a catalog entry. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackMetadata {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub duration_seconds: Option<f64>,
    /// kbps
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    /// Lowercase container name, e.g. `flac`.
    pub format: Option<String>,
}

/// Membership row of a duplicate group.
#[derive(Debug, Clone)]
pub struct DuplicateMember {
    pub group_id: String,
    pub file_id: i64,
    pub is_primary: bool,
    pub quality_score: i64,
    /// Rank within the group, 0 = primary.
    pub position: i64,
}

/// Display projection of one member joined back to catalog and metadata.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMemberView {
    pub file_id: i64,
    pub path: String,
    pub size: i64,
    pub is_primary: bool,
    pub quality_score: i64,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub bitrate: Option<u32>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroupView {
    pub group_id: String,
    pub members: Vec<DuplicateMemberView>,
}

impl DuplicateGroupView {
    pub fn primary(&self) -> Option<&DuplicateMemberView> {
        self.members.iter().find(|m| m.is_primary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Completed,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
        }
    }
}

impl ToSql for MigrationStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MigrationStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "completed" => Ok(MigrationStatus::Completed),
            "failed" => Ok(MigrationStatus::Failed),
            other => Err(FromSqlError::Other(
                format!("unknown migration status '{}'", other).into(),
            )),
        }
    }
}

/// Outcome of moving one catalog entry into the target tree.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub file_id: i64,
    pub source_path: String,
    pub target_path: String,
    pub status: MigrationStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

/// Resume state of an interrupted run, keyed by `(operation, job_key)`.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub operation: String,
    pub job_key: String,
    pub progress: usize,
    pub total: usize,
    pub processed_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogStatistics {
    pub total_files: i64,
    pub total_bytes: i64,
    pub status_counts: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStatusReport {
    pub total_files: i64,
    pub migrated_files: i64,
    pub progress_percentage: f64,
    pub recent_migrations: Vec<MigrationRecord>,
}
