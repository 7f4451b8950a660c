use rusqlite::{Connection, Result};
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        // journal_mode returns a row, so it can't go through execute_batch.
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        self.conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
        Ok(())
    }

    /// Catalog data from an unversioned database is not trusted; drop and recreate.
    /// A current database is only read here, so opening one never takes the write lock.
    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version >= SCHEMA_VERSION {
            return Ok(());
        }

        debug!("Schema version {} < {}, recreating tables", version, SCHEMA_VERSION);
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS checkpoint;
             DROP TABLE IF EXISTS migration_record;
             DROP TABLE IF EXISTS duplicate_member;
             DROP TABLE IF EXISTS track_metadata;
             DROP TABLE IF EXISTS catalog_file;",
        )?;
        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Full catalog reset. The only operation that moves entries backwards.
    pub fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM checkpoint;
             DELETE FROM migration_record;
             DELETE FROM duplicate_member;
             DELETE FROM track_metadata;
             DELETE FROM catalog_file;",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}
