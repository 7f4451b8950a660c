use music_sorter_core::storage::models::*;
use music_sorter_core::storage::Database;

fn make_entry(path: &str, size: i64, hash: Option<&str>) -> CatalogEntry {
    CatalogEntry {
        id: 0,
        source_path: path.to_string(),
        file_size: size,
        modified_at: 1700000000,
        partial_hash: hash.map(str::to_string),
        status: FileStatus::Indexed,
        error_message: None,
    }
}

fn make_record(file_id: i64, status: MigrationStatus) -> MigrationRecord {
    MigrationRecord {
        id: 0,
        file_id,
        source_path: "/src/a.mp3".to_string(),
        target_path: "/dst/Artist/a.mp3".to_string(),
        status,
        started_at: "2024-01-01T00:00:00+00:00".to_string(),
        completed_at: None,
        error: None,
    }
}

#[test]
fn test_insert_and_lookup_entry() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .insert_catalog_entry(&make_entry("/music/a.mp3", 100, Some("h1")))
        .unwrap();
    assert!(id > 0);

    assert!(db.catalog_contains("/music/a.mp3").unwrap());
    assert!(!db.catalog_contains("/music/b.mp3").unwrap());

    let entry = db.get_entry_by_path("/music/a.mp3").unwrap().unwrap();
    assert_eq!(entry.id, id);
    assert_eq!(entry.file_size, 100);
    assert_eq!(entry.partial_hash.as_deref(), Some("h1"));
    assert_eq!(entry.status, FileStatus::Indexed);
}

#[test]
fn test_source_path_is_unique() {
    let db = Database::open_in_memory().unwrap();
    db.insert_catalog_entry(&make_entry("/music/a.mp3", 100, None))
        .unwrap();
    assert!(db
        .insert_catalog_entry(&make_entry("/music/a.mp3", 200, None))
        .is_err());
}

#[test]
fn test_status_only_moves_forward() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .insert_catalog_entry(&make_entry("/music/a.mp3", 100, None))
        .unwrap();

    assert!(db.advance_status(id, FileStatus::Analyzed).unwrap());
    assert!(db.advance_status(id, FileStatus::Migrated).unwrap());
    assert!(!db.advance_status(id, FileStatus::Analyzed).unwrap());
    assert!(!db.mark_error(id, "late failure").unwrap());
    assert_eq!(
        db.get_catalog_entry(id).unwrap().unwrap().status,
        FileStatus::Migrated
    );
}

#[test]
fn test_hashed_entries_respect_min_size() {
    let db = Database::open_in_memory().unwrap();
    db.insert_catalog_entry(&make_entry("/a.mp3", 10, Some("h")))
        .unwrap();
    db.insert_catalog_entry(&make_entry("/b.mp3", 5000, Some("h")))
        .unwrap();
    db.insert_catalog_entry(&make_entry("/c.mp3", 5000, None))
        .unwrap();

    assert_eq!(db.hashed_entries(0).unwrap().len(), 2);
    let large = db.hashed_entries(1000).unwrap();
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].source_path, "/b.mp3");
}

#[test]
fn test_metadata_upsert_overwrites() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .insert_catalog_entry(&make_entry("/a.mp3", 10, None))
        .unwrap();
    assert_eq!(db.entries_missing_metadata().unwrap().len(), 1);

    let mut meta = TrackMetadata {
        artist: Some("First".to_string()),
        bitrate: Some(192),
        ..TrackMetadata::default()
    };
    db.upsert_metadata(id, &meta).unwrap();
    meta.artist = Some("Second".to_string());
    db.upsert_metadata(id, &meta).unwrap();

    assert_eq!(db.get_metadata(id).unwrap(), Some(meta));
    assert!(db.entries_missing_metadata().unwrap().is_empty());
    assert_eq!(db.metadata_by_file().unwrap().len(), 1);
}

#[test]
fn test_replace_duplicate_groups_discards_previous() {
    let db = Database::open_in_memory().unwrap();
    let a = db
        .insert_catalog_entry(&make_entry("/a.mp3", 10, Some("h")))
        .unwrap();
    let b = db
        .insert_catalog_entry(&make_entry("/b.mp3", 10, Some("h")))
        .unwrap();
    let member = |group: &str, file_id, position| DuplicateMember {
        group_id: group.to_string(),
        file_id,
        is_primary: position == 0,
        quality_score: 50 - position,
        position,
    };

    db.replace_duplicate_groups(&[member("g1", a, 0), member("g1", b, 1)])
        .unwrap();
    db.replace_duplicate_groups(&[member("g2", b, 0), member("g2", a, 1)])
        .unwrap();

    let groups = db.get_duplicate_groups(10).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].group_id, "g2");
    assert_eq!(groups[0].members[0].file_id, b);
    assert_eq!(groups[0].primary().unwrap().file_id, b);
}

#[test]
fn test_non_primary_members_are_not_migration_candidates() {
    let db = Database::open_in_memory().unwrap();
    let a = db
        .insert_catalog_entry(&make_entry("/a.mp3", 10, Some("h")))
        .unwrap();
    let b = db
        .insert_catalog_entry(&make_entry("/b.mp3", 10, Some("h")))
        .unwrap();
    db.insert_catalog_entry(&make_entry("/c.mp3", 10, None))
        .unwrap();
    db.replace_duplicate_groups(&[
        DuplicateMember {
            group_id: "g".to_string(),
            file_id: a,
            is_primary: true,
            quality_score: 10,
            position: 0,
        },
        DuplicateMember {
            group_id: "g".to_string(),
            file_id: b,
            is_primary: false,
            quality_score: 0,
            position: 1,
        },
    ])
    .unwrap();

    let skipping: Vec<_> = db
        .migration_candidates(true)
        .unwrap()
        .into_iter()
        .map(|e| e.source_path)
        .collect();
    assert_eq!(skipping, vec!["/a.mp3", "/c.mp3"]);
    assert_eq!(db.migration_candidates(false).unwrap().len(), 3);
}

#[test]
fn test_one_migration_record_per_entry() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .insert_catalog_entry(&make_entry("/src/a.mp3", 10, None))
        .unwrap();

    db.record_migration(&make_record(id, MigrationStatus::Failed))
        .unwrap();
    assert!(!db.has_completed_migration(id).unwrap());

    let mut done = make_record(id, MigrationStatus::Completed);
    done.completed_at = Some("2024-01-01T00:00:05+00:00".to_string());
    db.record_migration(&done).unwrap();
    db.record_migration(&done).unwrap();

    assert!(db.has_completed_migration(id).unwrap());
    let count: i64 = db
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM migration_record WHERE file_id = ?1",
            rusqlite::params![id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_checkpoint_round_trip_and_clear() {
    let db = Database::open_in_memory().unwrap();
    let mut checkpoint = Checkpoint {
        operation: "index".to_string(),
        job_key: "/music".to_string(),
        progress: 2,
        total: 10,
        processed_paths: vec!["/music/a.mp3".to_string(), "/music/b.mp3".to_string()],
    };
    db.save_checkpoint(&checkpoint).unwrap();
    checkpoint.progress = 3;
    checkpoint.processed_paths.push("/music/c.mp3".to_string());
    db.save_checkpoint(&checkpoint).unwrap();

    let loaded = db.load_checkpoint("index", "/music").unwrap().unwrap();
    assert_eq!(loaded.progress, 3);
    assert_eq!(loaded.total, 10);
    assert_eq!(loaded.processed_paths.len(), 3);
    assert!(db.load_checkpoint("index", "/other").unwrap().is_none());

    assert!(db.clear_checkpoint("index", "/music").unwrap());
    assert!(!db.clear_checkpoint("index", "/music").unwrap());
    assert!(db.load_checkpoint("index", "/music").unwrap().is_none());
}

#[test]
fn test_truncate_all_empties_catalog() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .insert_catalog_entry(&make_entry("/a.mp3", 10, None))
        .unwrap();
    db.upsert_metadata(id, &TrackMetadata::default()).unwrap();
    db.record_migration(&make_record(id, MigrationStatus::Completed))
        .unwrap();

    db.truncate_all().unwrap();

    let stats = db.catalog_statistics().unwrap();
    assert_eq!(stats.total_files, 0);
    assert_eq!(stats.total_bytes, 0);
    assert!(stats.status_counts.is_empty());
    assert_eq!(db.migration_status().unwrap().migrated_files, 0);
}

#[test]
fn test_open_while_another_connection_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let path = path.to_str().unwrap();

    let writer = Database::open(path).unwrap();
    writer
        .insert_catalog_entry(&make_entry("/a.mp3", 10, None))
        .unwrap();
    let tx = writer.connection().unchecked_transaction().unwrap();
    writer
        .insert_catalog_entry(&make_entry("/b.mp3", 10, None))
        .unwrap();

    let second = Database::open(path).unwrap();
    assert!(second.catalog_contains("/a.mp3").unwrap());
    assert!(!second.catalog_contains("/b.mp3").unwrap());

    tx.commit().unwrap();
    assert!(second.catalog_contains("/b.mp3").unwrap());
    second
        .insert_catalog_entry(&make_entry("/c.mp3", 10, None))
        .unwrap();
    assert_eq!(writer.catalog_statistics().unwrap().total_files, 3);
}
