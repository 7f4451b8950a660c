use glob::Pattern;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::vec;
use tracing::{error, warn};
use walkdir::{DirEntry, WalkDir};

/// Recognized audio extensions, compared case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "flac", "m4a", "aac", "ogg", "wma"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Audio files under a root, emitted directory by directory.
///
/// The whole tree is traversed on the first call to `next`, files are bucketed by
/// parent directory, and buckets are emitted in path order with files sorted by
/// name inside each bucket. Sequential per-directory emission keeps reads close
/// together on spinning disks. The sequence is finite and cannot be restarted.
pub struct LocalityWalker {
    root: PathBuf,
    ignore_patterns: Vec<Pattern>,
    state: WalkState,
}

enum WalkState {
    Pending,
    Emitting(vec::IntoIter<PathBuf>),
}

impl LocalityWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: Vec::new(),
            state: WalkState::Pending,
        }
    }

    /// Prune files and directories matching any of the glob patterns.
    pub fn with_ignore_patterns(mut self, ignore_globs: &[String]) -> Self {
        self.ignore_patterns = compile_patterns(ignore_globs);
        self
    }

    fn collect_ordered(&self) -> Vec<PathBuf> {
        let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

        for entry in walk_entries(&self.root, &self.ignore_patterns) {
            let path = entry.into_path();
            if !is_audio_file(&path) {
                continue;
            }
            let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
            by_dir.entry(parent).or_default().push(path);
        }

        let mut ordered = Vec::new();
        for (_, mut files) in by_dir {
            files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            ordered.extend(files);
        }
        ordered
    }
}

impl Iterator for LocalityWalker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        if let WalkState::Pending = self.state {
            self.state = WalkState::Emitting(self.collect_ordered().into_iter());
        }
        match &mut self.state {
            WalkState::Emitting(files) => files.next(),
            WalkState::Pending => None,
        }
    }
}

/// Lightweight count of audio files and their total size, for progress totals.
/// Entries that cannot be stat'ed are counted without a size.
pub fn estimate_count(root: &Path, ignore_globs: &[String]) -> (usize, u64) {
    let patterns = compile_patterns(ignore_globs);
    let mut count = 0usize;
    let mut total_bytes = 0u64;

    for entry in walk_entries(root, &patterns) {
        if !is_audio_file(entry.path()) {
            continue;
        }
        count += 1;
        if let Ok(metadata) = fs::metadata(entry.path()) {
            total_bytes += metadata.len();
        }
    }

    (count, total_bytes)
}

/// Group an iterator into chunks of `batch_size`; the last chunk may be shorter.
pub fn batch<I: Iterator>(iter: I, batch_size: usize) -> Batches<I> {
    Batches {
        iter,
        batch_size: batch_size.max(1),
    }
}

pub struct Batches<I> {
    iter: I,
    batch_size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<_> = self.iter.by_ref().take(self.batch_size).collect();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

fn compile_patterns(ignore_globs: &[String]) -> Vec<Pattern> {
    ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

fn walk_entries<'a>(
    root: &Path,
    ignore_patterns: &'a [Pattern],
) -> impl Iterator<Item = DirEntry> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| {
            entry.depth() == 0
                || !ignore_patterns
                    .iter()
                    .any(|pattern| pattern.matches_path(entry.path()))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Error accessing entry: {}", err);
                None
            }
        })
        .filter(is_file_like)
}

/// Regular files, plus symlinks that do not point at a directory. Symlinked
/// directories are never descended; dangling links are kept so the indexer can
/// report them.
fn is_file_like(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && !entry.path().is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert!(is_audio_file(Path::new("/x/Track.MP3")));
        assert!(is_audio_file(Path::new("/x/track.Flac")));
        assert!(!is_audio_file(Path::new("/x/cover.jpg")));
        assert!(!is_audio_file(Path::new("/x/README")));
    }

    #[test]
    fn test_walker_emits_directories_in_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::create_dir_all(root.join("a/nested")).unwrap();
        fs::write(root.join("b/2.mp3"), b"x").unwrap();
        fs::write(root.join("b/1.wav"), b"x").unwrap();
        fs::write(root.join("a/nested/z.ogg"), b"x").unwrap();
        fs::write(root.join("a/y.flac"), b"x").unwrap();
        fs::write(root.join("a/notes.txt"), b"x").unwrap();
        fs::write(root.join("top.m4a"), b"x").unwrap();

        let emitted: Vec<PathBuf> = LocalityWalker::new(root)
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            emitted,
            vec![
                PathBuf::from("top.m4a"),
                PathBuf::from("a/y.flac"),
                PathBuf::from("a/nested/z.ogg"),
                PathBuf::from("b/1.wav"),
                PathBuf::from("b/2.mp3"),
            ]
        );
    }

    #[test]
    fn test_walker_skips_ignored_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("keep")).unwrap();
        fs::create_dir_all(root.join("skip")).unwrap();
        fs::write(root.join("keep/a.mp3"), b"x").unwrap();
        fs::write(root.join("skip/b.mp3"), b"x").unwrap();

        let emitted: Vec<PathBuf> = LocalityWalker::new(root)
            .with_ignore_patterns(&["**/skip/**".to_string()])
            .collect();
        assert_eq!(emitted, vec![root.join("keep/a.mp3")]);
    }

    #[test]
    fn test_estimate_counts_audio_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.mp3"), vec![0u8; 10]).unwrap();
        fs::write(root.join("b.aac"), vec![0u8; 5]).unwrap();
        fs::write(root.join("c.txt"), vec![0u8; 100]).unwrap();

        assert_eq!(estimate_count(root, &[]), (2, 15));
    }

    #[test]
    fn test_estimate_of_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        assert_eq!(estimate_count(&dir.path().join("nope"), &[]), (0, 0));
    }

    #[test]
    fn test_batch_keeps_short_tail() {
        let chunks: Vec<Vec<u32>> = batch(1..=7, 3).collect();
        assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
        assert_eq!(batch(std::iter::empty::<u32>(), 3).count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_walked() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let elsewhere = dir.path().join("elsewhere");
        let root = dir.path().join("library");
        fs::create_dir_all(elsewhere.join("album")).unwrap();
        fs::create_dir_all(&root).unwrap();
        fs::write(elsewhere.join("real.mp3"), vec![0u8; 7]).unwrap();
        fs::write(elsewhere.join("album/inner.mp3"), b"x").unwrap();
        fs::write(root.join("plain.mp3"), vec![0u8; 3]).unwrap();
        symlink(elsewhere.join("real.mp3"), root.join("linked.mp3")).unwrap();
        symlink(elsewhere.join("album"), root.join("linked_dir")).unwrap();

        let emitted: Vec<PathBuf> = LocalityWalker::new(&root).collect();
        assert_eq!(
            emitted,
            vec![root.join("linked.mp3"), root.join("plain.mp3")]
        );
        assert_eq!(estimate_count(&root, &[]), (2, 10));
    }
}
