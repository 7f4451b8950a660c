//! Target path construction: sanitized artist folder, original file name,
//! bounded total length and `_N` collision suffixes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Longest sanitized folder name.
pub const MAX_COMPONENT_LEN: usize = 100;

/// Longest target path, in characters.
pub const MAX_PATH_LEN: usize = 250;

pub const UNKNOWN_ARTIST: &str = "Unknown";

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn replace_illegal(name: &str) -> String {
    name.chars()
        .map(|c| {
            if ILLEGAL_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Folder-safe form of a metadata value such as an artist name.
pub fn sanitize_component(name: &str) -> String {
    let cleaned = collapse_whitespace(&replace_illegal(name));
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    let truncated: String = trimmed.chars().take(MAX_COMPONENT_LEN).collect();
    let truncated = truncated.trim_end_matches(|c| c == '.' || c == ' ');
    if truncated.is_empty() {
        UNKNOWN_ARTIST.to_string()
    } else {
        truncated.to_string()
    }
}

/// File-name-safe form of an existing file name. The extension is kept as is.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = replace_illegal(name);
    let trimmed = cleaned.trim_end_matches(|c| c == '.' || c == ' ').trim_start();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn char_len(path: &Path) -> usize {
    path.as_os_str().to_string_lossy().chars().count()
}

/// Shorten the file stem so the whole path fits in `max_len` characters.
pub fn cap_path_length(path: PathBuf, max_len: usize) -> PathBuf {
    if char_len(&path) <= max_len {
        return path;
    }
    let (Some(parent), Some(stem)) = (path.parent(), path.file_stem()) else {
        return path;
    };
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let reserved = char_len(parent) + 1 + ext.chars().count();
    let keep = max_len.saturating_sub(reserved).max(1);
    let stem: String = stem.to_string_lossy().chars().take(keep).collect();
    parent.join(format!("{}{}", stem, ext))
}

/// `base / artist-or-Unknown / original file name`.
pub fn target_path(base: &Path, artist: Option<&str>, source: &Path) -> PathBuf {
    let folder = artist
        .map(sanitize_component)
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
    let file_name = source
        .file_name()
        .map(|n| sanitize_filename(&n.to_string_lossy()))
        .unwrap_or_else(|| "unnamed".to_string());
    cap_path_length(base.join(folder).join(file_name), MAX_PATH_LEN)
}

/// `stem_N.ext`, with the stem shortened so the suffixed path stays within `max_len`.
fn with_suffix(path: &Path, n: usize, max_len: usize) -> PathBuf {
    let suffix = format!("_{}", n);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reserved = path.parent().map(char_len).unwrap_or(0)
        + 1
        + suffix.chars().count()
        + ext.chars().count();
    let keep = max_len.saturating_sub(reserved).max(1);
    let stem: String = stem.chars().take(keep).collect();
    path.with_file_name(format!("{}{}{}", stem, suffix, ext))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSlot {
    /// Nothing exists here yet.
    Free(PathBuf),
    /// A file of the same size is already in place.
    AlreadyPresent(PathBuf),
}

/// Pick where a file of `source_size` bytes should land. An occupied `target`
/// of a different size pushes the file to the first free `name_N.ext`.
pub fn resolve_collision(target: &Path, source_size: u64) -> io::Result<TargetSlot> {
    match fs::metadata(target) {
        Ok(existing) if existing.len() == source_size => {
            return Ok(TargetSlot::AlreadyPresent(target.to_path_buf()))
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(TargetSlot::Free(target.to_path_buf()))
        }
        Err(e) => return Err(e),
    }

    let mut n = 1;
    loop {
        let candidate = with_suffix(target, n, MAX_PATH_LEN);
        if !candidate.exists() {
            return Ok(TargetSlot::Free(candidate));
        }
        n += 1;
    }
}
