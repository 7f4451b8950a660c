use crate::config::AppConfig;
use crate::error::Result;
use crate::progress::{CancelToken, ProgressCounters, ProgressReporter, ProgressUpdate, Stage};
use crate::storage::models::{CatalogEntry, DuplicateMember, TrackMetadata};
use crate::storage::Database;
use ahash::AHashMap;
use rayon::prelude::*;
use std::path::{Component, Path};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Progress is reported every this many files while grouping and groups while scoring.
const REPORT_EVERY: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct DuplicateStats {
    pub groups: usize,
    /// Members of all groups, primaries included.
    pub duplicate_files: usize,
    /// Bytes held by non-primary members.
    pub space_savings: u64,
    pub stopped: bool,
    pub elapsed: Duration,
}

fn bitrate_score(bitrate: Option<u32>) -> i64 {
    match bitrate {
        Some(b) if b >= 320 => 100,
        Some(b) if b >= 256 => 80,
        Some(b) if b >= 192 => 60,
        Some(b) if b >= 128 => 40,
        Some(_) => 20,
        None => 0,
    }
}

fn format_score(format: Option<&str>) -> i64 {
    match format.map(str::to_ascii_lowercase).as_deref() {
        Some("flac") => 150,
        Some("wav") => 140,
        Some("m4a") => 90,
        Some("mp3") => 70,
        Some("aac") => 60,
        Some("ogg") => 50,
        Some("wma") => 30,
        _ => 0,
    }
}

fn path_score(path: &Path) -> i64 {
    let mut score = 0;
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect();
    if segments.iter().any(|s| s == "music" || s == "audio") {
        score += 10;
    }
    if segments.iter().any(|s| s == "backup") {
        score -= 20;
    }
    score
}

/// Higher is better. Missing metadata scores zero for the tag-based parts.
pub fn quality_score(entry: &CatalogEntry, metadata: Option<&TrackMetadata>) -> i64 {
    let mut score = 0;
    if let Some(meta) = metadata {
        score += bitrate_score(meta.bitrate);
        score += format_score(meta.format.as_deref());
        score += [&meta.artist, &meta.album, &meta.title]
            .iter()
            .filter(|field| field.is_some())
            .count() as i64
            * 20;
        if meta.year.is_some() {
            score += 10;
        }
    }
    score + path_score(Path::new(&entry.source_path))
}

/// Group hashed catalog entries by partial hash, elect one primary per group and
/// replace all previously stored groups with the new set.
///
/// A cancelled run returns `stopped` without touching the stored groups.
pub fn find_duplicates(
    db: &Database,
    config: &AppConfig,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<DuplicateStats> {
    let start = Instant::now();
    let min_size = i64::try_from(config.dedupe.min_file_size_bytes).unwrap_or(i64::MAX);
    let entries = db.hashed_entries(min_size)?;
    let total_files = entries.len();
    info!("Grouping {} hashed files", total_files);
    reporter.on_stage_start(Stage::Dedupe, total_files);

    let mut stats = DuplicateStats::default();

    // Keys are kept in first-seen order so group and member order follow catalog order.
    let mut order: Vec<String> = Vec::new();
    let mut by_hash: AHashMap<String, Vec<CatalogEntry>> = AHashMap::new();
    for (i, entry) in entries.into_iter().enumerate() {
        if cancel.is_cancelled() {
            stats.stopped = true;
            break;
        }
        let Some(hash) = entry.partial_hash.clone() else {
            continue;
        };
        by_hash
            .entry(hash.clone())
            .or_insert_with(|| {
                order.push(hash);
                Vec::new()
            })
            .push(entry);

        let processed = i + 1;
        if processed % REPORT_EVERY == 0 || processed == total_files {
            reporter.on_progress(&ProgressUpdate {
                operation: Stage::Dedupe,
                progress: processed,
                total: total_files,
                message: format!("Grouping files: {}/{}", processed, total_files),
                counters: ProgressCounters::default(),
            });
        }
    }

    if stats.stopped {
        stats.elapsed = start.elapsed();
        info!("Duplicate detection stopped while grouping");
        reporter.on_stage_complete(Stage::Dedupe, stats.elapsed);
        return Ok(stats);
    }

    let groups: Vec<Vec<CatalogEntry>> = order
        .into_iter()
        .filter_map(|hash| by_hash.remove(&hash))
        .filter(|members| members.len() > 1)
        .collect();
    let group_total = groups.len();
    debug!("{} candidate groups", group_total);

    let metadata = db.metadata_by_file()?;
    let mut members: Vec<DuplicateMember> = Vec::new();

    for (chunk_index, chunk) in groups.chunks(REPORT_EVERY).enumerate() {
        if cancel.is_cancelled() {
            stats.stopped = true;
            break;
        }

        let scored: Vec<Vec<(&CatalogEntry, i64)>> = chunk
            .par_iter()
            .map(|group| {
                let mut scored: Vec<(&CatalogEntry, i64)> = group
                    .iter()
                    .map(|entry| (entry, quality_score(entry, metadata.get(&entry.id))))
                    .collect();
                // Stable: equal scores keep first-seen order.
                scored.sort_by(|a, b| b.1.cmp(&a.1));
                scored
            })
            .collect();

        for group in scored {
            let group_id = Uuid::new_v4().to_string();
            for (position, (entry, score)) in group.iter().enumerate() {
                if position > 0 {
                    stats.space_savings += entry.file_size.max(0) as u64;
                }
                members.push(DuplicateMember {
                    group_id: group_id.clone(),
                    file_id: entry.id,
                    is_primary: position == 0,
                    quality_score: *score,
                    position: position as i64,
                });
            }
            stats.groups += 1;
            stats.duplicate_files += group.len();
        }

        let processed = (chunk_index * REPORT_EVERY + chunk.len()).min(group_total);
        reporter.on_progress(&ProgressUpdate {
            operation: Stage::Dedupe,
            progress: processed,
            total: group_total,
            message: format!("Analyzing groups: {}/{}", processed, group_total),
            counters: ProgressCounters {
                groups: stats.groups,
                ..ProgressCounters::default()
            },
        });
    }

    if !stats.stopped {
        db.replace_duplicate_groups(&members)?;
    }

    stats.elapsed = start.elapsed();
    reporter.on_stage_complete(Stage::Dedupe, stats.elapsed);
    info!(
        "Duplicate detection complete: {} groups, {} files, {:.2} MB reclaimable",
        stats.groups,
        stats.duplicate_files,
        stats.space_savings as f64 / 1024.0 / 1024.0
    );
    Ok(stats)
}
