//! Tag extraction stage.
//!
//! Reads tags and stream properties with lofty, fills missing artist/title from
//! the filename, stores one `track_metadata` row per entry and advances the entry
//! to `analyzed`.

use crate::config::AppConfig;
use crate::error::Result;
use crate::indexer::ERROR_SAMPLE_LIMIT;
use crate::progress::{CancelToken, ProgressCounters, ProgressReporter, ProgressUpdate, Stage};
use crate::scanner;
use crate::storage::models::{FileStatus, TrackMetadata};
use crate::storage::Database;
use lofty::file::{FileType, TaggedFileExt};
use lofty::prelude::*;
use lofty::probe::Probe;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to read tags: {0}")]
    ReadError(String),
}

/// Source of tag data for a single file.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> std::result::Result<TrackMetadata, MetadataError>;
}

/// Reads embedded tags and audio properties with lofty.
pub struct TagReader;

impl MetadataReader for TagReader {
    fn read(&self, path: &Path) -> std::result::Result<TrackMetadata, MetadataError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| MetadataError::ReadError(e.to_string()))?
            .read()
            .map_err(|e| MetadataError::ReadError(e.to_string()))?;

        let properties = tagged_file.properties();
        let format = match tagged_file.file_type() {
            FileType::Mpeg => Some("mp3"),
            FileType::Flac => Some("flac"),
            FileType::Mp4 => Some("m4a"),
            FileType::Vorbis | FileType::Opus => Some("ogg"),
            FileType::Aac => Some("aac"),
            FileType::Wav => Some("wav"),
            _ => None,
        }
        .map(str::to_string);

        let mut metadata = TrackMetadata {
            duration_seconds: Some(properties.duration().as_secs_f64()),
            bitrate: properties.audio_bitrate(),
            sample_rate: properties.sample_rate(),
            format,
            ..TrackMetadata::default()
        };

        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            metadata.artist = non_empty(tag.artist().map(|s| s.to_string()));
            metadata.album = non_empty(tag.album().map(|s| s.to_string()));
            metadata.title = non_empty(tag.title().map(|s| s.to_string()));
            metadata.genre = non_empty(tag.genre().map(|s| s.to_string()));
            metadata.track_number = tag.track();
            metadata.year = tag.year().and_then(|y| i32::try_from(y).ok());
        }

        Ok(metadata)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn filename_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Artist - Album - 03 - Title
            r"^(?P<artist>[^-]+?)\s*-\s*(?P<album>[^-]+?)\s*-\s*(?P<track>\d+)\s*-\s*(?P<title>[^.]+)",
            // 03 - Title
            r"^(?P<track>\d+)\s*-\s*(?P<title>[^.]+)",
            // 03. Artist - Title
            r"^(?P<track>\d+)\.?\s*(?P<artist>[^-]+?)\s*-\s*(?P<title>[^.]+)",
            // Artist - Title
            r"^(?P<artist>[^-]+?)\s*-\s*(?P<title>[^.]+)",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("filename pattern is valid"))
        .collect()
    })
}

/// Best-effort metadata from a file name; the first matching pattern wins and a
/// name matching nothing becomes the title.
pub fn parse_filename(path: &Path) -> TrackMetadata {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut metadata = TrackMetadata::default();

    for pattern in filename_patterns() {
        if let Some(caps) = pattern.captures(&stem) {
            let field = |name: &str| non_empty(caps.name(name).map(|m| m.as_str().to_string()));
            metadata.artist = field("artist");
            metadata.album = field("album");
            metadata.title = field("title");
            metadata.track_number = caps.name("track").and_then(|m| m.as_str().parse().ok());
            break;
        }
    }

    if metadata.artist.is_none() && metadata.title.is_none() && metadata.album.is_none() {
        metadata.title = non_empty(Some(stem));
    }
    metadata
}

/// Tags first, filename for whatever the tags lack, extension for the format.
pub fn read_track_metadata(reader: &dyn MetadataReader, path: &Path) -> TrackMetadata {
    let mut metadata = match reader.read(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Error extracting tags from {}: {}", path.display(), e);
            TrackMetadata::default()
        }
    };

    if metadata.artist.is_none() || metadata.title.is_none() {
        let from_name = parse_filename(path);
        metadata.artist = metadata.artist.or(from_name.artist);
        metadata.title = metadata.title.or(from_name.title);
        metadata.album = metadata.album.or(from_name.album);
        metadata.track_number = metadata.track_number.or(from_name.track_number);
    }

    if metadata.format.is_none() {
        metadata.format = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());
    }
    metadata
}

#[derive(Debug, Clone)]
pub struct MetadataResult {
    pub extracted: usize,
    pub failed: usize,
    pub error_files: Vec<String>,
    pub stopped: bool,
    pub elapsed: Duration,
}

enum Extraction {
    Read(i64, TrackMetadata),
    SourceMissing(i64),
}

/// Extract metadata for every `indexed` entry that has none, one transaction per batch.
pub fn extract_metadata(
    db: &Database,
    config: &AppConfig,
    reader: &dyn MetadataReader,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<MetadataResult> {
    let start = Instant::now();
    let entries = db.entries_missing_metadata()?;
    let total = entries.len();
    info!("Extracting metadata for {} files", total);
    reporter.on_stage_start(Stage::Metadata, total);

    let mut processed = 0usize;
    let mut extracted = 0usize;
    let mut failed = 0usize;
    let mut error_files = Vec::new();
    let mut stopped = false;

    for chunk in scanner::batch(entries.into_iter(), config.source.batch_size) {
        if cancel.is_cancelled() {
            stopped = true;
            break;
        }
        // Tags are read with no transaction open; the batch's writes follow in one.
        let mut outcomes = Vec::with_capacity(chunk.len());
        for entry in chunk {
            if cancel.is_cancelled() {
                stopped = true;
                break;
            }
            processed += 1;

            let path = Path::new(&entry.source_path);
            if path.exists() {
                outcomes.push(Extraction::Read(entry.id, read_track_metadata(reader, path)));
                extracted += 1;
            } else {
                error!("Source file missing: {}", entry.source_path);
                outcomes.push(Extraction::SourceMissing(entry.id));
                failed += 1;
                if error_files.len() < ERROR_SAMPLE_LIMIT {
                    error_files.push(entry.source_path.clone());
                }
            }

            reporter.on_progress(&ProgressUpdate {
                operation: Stage::Metadata,
                progress: processed,
                total,
                message: format!("Extracting metadata: {}/{}", processed, total),
                counters: ProgressCounters {
                    added: extracted,
                    skipped: 0,
                    failed,
                    groups: 0,
                },
            });
        }

        if !outcomes.is_empty() {
            let tx = db.connection().unchecked_transaction()?;
            for outcome in &outcomes {
                match outcome {
                    Extraction::Read(id, metadata) => {
                        db.upsert_metadata(*id, metadata)?;
                        db.advance_status(*id, FileStatus::Analyzed)?;
                    }
                    Extraction::SourceMissing(id) => {
                        db.mark_error(*id, "source file missing")?;
                    }
                }
            }
            tx.commit()?;
        }

        if stopped {
            break;
        }
    }

    let elapsed = start.elapsed();
    reporter.on_stage_complete(Stage::Metadata, elapsed);
    info!(
        "Metadata extraction complete: {} extracted, {} failed",
        extracted, failed
    );

    Ok(MetadataResult {
        extracted,
        failed,
        error_files,
        stopped,
        elapsed,
    })
}
