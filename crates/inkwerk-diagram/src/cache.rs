// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content-addressed diagram cache.
//
// Two coupled stores behind one abstraction: an on-disk blob store keyed by
// content hash (one file per hash, authoritative) and a SQLite index row per
// hash (type tag, blob references, created/last-accessed timestamps).
// Invariant: an index row whose blob is missing is treated as a miss —
// `lookup` drops the stale row so the caller regenerates the entry.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use inkwerk_core::error::{InkwerkError, Result};

/// SQLite schema for the cache index.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS diagram_cache (
        image_hash     TEXT PRIMARY KEY,
        diagram_type   TEXT NOT NULL,
        original_path  TEXT NOT NULL,
        converted_path TEXT NOT NULL,
        created_at     TEXT NOT NULL,
        last_accessed  TEXT NOT NULL
    )
"#;

/// Convert a `rusqlite::Error` into an `InkwerkError::Database`.
fn db_err(e: rusqlite::Error) -> InkwerkError {
    InkwerkError::Database(e.to_string())
}

/// One index record, queryable by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub image_hash: String,
    pub diagram_type: String,
    pub original_path: String,
    pub converted_path: String,
    pub created_at: String,
    pub last_accessed: String,
}

/// Content-addressed cache of stylized diagram rasters.
pub struct DiagramCache {
    conn: Connection,
    blob_dir: PathBuf,
}

impl DiagramCache {
    /// Open (or create) the cache rooted at `blob_dir`. The index database
    /// lives alongside the blobs; WAL mode keeps concurrent readers cheap.
    #[instrument(skip_all, fields(blob_dir = %blob_dir.as_ref().display()))]
    pub fn open(blob_dir: impl AsRef<Path>) -> Result<Self> {
        let blob_dir = blob_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&blob_dir)?;

        let conn = Connection::open(blob_dir.join("index.db")).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        info!("diagram cache opened");
        Ok(Self { conn, blob_dir })
    }

    /// Open a cache with an in-memory index (useful for tests; blobs still
    /// need a real directory).
    pub fn open_in_memory(blob_dir: impl AsRef<Path>) -> Result<Self> {
        let blob_dir = blob_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&blob_dir)?;

        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory diagram cache opened");
        Ok(Self { conn, blob_dir })
    }

    /// Path of the converted blob for a hash.
    pub fn blob_path(&self, hash: &str) -> PathBuf {
        self.blob_dir.join(format!("{hash}.png"))
    }

    /// Path of the preserved original for a hash.
    fn original_path(&self, hash: &str) -> PathBuf {
        self.blob_dir.join(format!("{hash}_original.png"))
    }

    /// Look up the converted raster for a content hash.
    ///
    /// Order: the blob file directly (fast path, no index touch); then the
    /// index record, returning its blob and bumping last-access. An index
    /// row pointing at a missing blob self-heals: the row is dropped and
    /// the lookup reports a miss so the entry is regenerated.
    #[instrument(skip(self), fields(hash))]
    pub fn lookup(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let direct = self.blob_path(hash);
        if direct.exists() {
            debug!("cache hit (blob)");
            return Ok(Some(std::fs::read(direct)?));
        }

        if let Some(entry) = self.get_entry(hash)? {
            let converted = PathBuf::from(&entry.converted_path);
            if converted.exists() {
                debug!("cache hit (index)");
                self.touch(hash)?;
                return Ok(Some(std::fs::read(converted)?));
            }

            warn!(hash, "index row references a missing blob; healing as miss");
            self.remove(hash)?;
        }

        Ok(None)
    }

    /// Persist a converted diagram and its original, then upsert the index
    /// row. Insertion is idempotent per hash — concurrent jobs converting
    /// identical content race benignly, last writer wins.
    #[instrument(skip(self, original, converted), fields(hash, diagram_type))]
    pub fn insert(
        &self,
        hash: &str,
        diagram_type: &str,
        original: &[u8],
        converted: &[u8],
    ) -> Result<PathBuf> {
        let converted_path = self.blob_path(hash);
        let original_path = self.original_path(hash);

        std::fs::write(&converted_path, converted)?;
        std::fs::write(&original_path, original)?;

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR REPLACE INTO diagram_cache
                 (image_hash, diagram_type, original_path, converted_path, created_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    hash,
                    diagram_type,
                    original_path.to_string_lossy().into_owned(),
                    converted_path.to_string_lossy().into_owned(),
                    now,
                    now,
                ],
            )
            .map_err(db_err)?;

        info!(hash, "diagram cached");
        Ok(converted_path)
    }

    /// Fetch the index record for a hash, if present.
    pub fn get_entry(&self, hash: &str) -> Result<Option<CacheEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT image_hash, diagram_type, original_path, converted_path,
                        created_at, last_accessed
                 FROM diagram_cache WHERE image_hash = ?1",
            )
            .map_err(db_err)?;

        let mut rows = stmt
            .query_map(params![hash], |row| {
                Ok(CacheEntry {
                    image_hash: row.get(0)?,
                    diagram_type: row.get(1)?,
                    original_path: row.get(2)?,
                    converted_path: row.get(3)?,
                    created_at: row.get(4)?,
                    last_accessed: row.get(5)?,
                })
            })
            .map_err(db_err)?;

        match rows.next() {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(e)) => Err(db_err(e)),
            None => Ok(None),
        }
    }

    /// Bump the last-access timestamp of an entry.
    fn touch(&self, hash: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE diagram_cache SET last_accessed = ?1 WHERE image_hash = ?2",
                params![now, hash],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Drop a stale index row.
    fn remove(&self, hash: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM diagram_cache WHERE image_hash = ?1",
                params![hash],
            )
            .map_err(db_err)?;
        Ok(())
    }
}
