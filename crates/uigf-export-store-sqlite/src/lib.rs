//! Read-only SQLite reader for the `gacha_items` table of a save database.
//!
//! The database is owned by the game save tooling, never by this exporter,
//! so the connection is opened read-only and issues at most two data
//! queries per export run: default-uid discovery and the full record fetch.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use uigf_export_core::{ExportError, PullRecord};

pub struct GachaStore {
    conn: Connection,
}

impl GachaStore {
    /// Open the save database read-only.
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened or pragmas cannot
    /// be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Resolve the archive id to export: an explicit request wins,
    /// otherwise the first-encountered distinct id in the store.
    ///
    /// Scan order decides the default, so it is not deterministic across
    /// stores holding multiple identities; callers needing determinism
    /// pass an explicit id.
    ///
    /// # Errors
    /// Returns [`ExportError::EmptyStore`] when no request was made and
    /// the store holds no records at all.
    pub fn resolve_archive_id(&self, requested: Option<i64>) -> Result<i64> {
        match requested {
            Some(archive_id) => Ok(archive_id),
            None => self.first_archive_id(),
        }
    }

    /// First-encountered distinct archive id in the store.
    ///
    /// # Errors
    /// Returns [`ExportError::EmptyStore`] when the table has no rows.
    pub fn first_archive_id(&self) -> Result<i64> {
        let mut stmt =
            self.conn.prepare("SELECT DISTINCT ArchiveId FROM gacha_items LIMIT 1")?;
        let archive_id = stmt
            .query_row([], |row| row.get::<_, i64>(0))
            .optional()
            .context("failed to query distinct archive ids")?;

        archive_id.ok_or_else(|| anyhow::Error::from(ExportError::EmptyStore))
    }

    /// All distinct archive ids, ascending. An empty store yields `[]`.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn list_archive_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT ArchiveId FROM gacha_items ORDER BY ArchiveId ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut archive_ids = Vec::new();
        for row in rows {
            archive_ids.push(row?);
        }

        Ok(archive_ids)
    }

    /// All pull records for one archive id, ascending by display record id.
    ///
    /// The ordering governs the final export list and is stable, so
    /// re-exporting an unchanged store yields identical list contents.
    ///
    /// # Errors
    /// Returns [`ExportError::NoRecordsForUid`] when the id has no rows,
    /// or an error when rows cannot be read.
    pub fn records_for_archive(&self, archive_id: i64) -> Result<Vec<PullRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT InnerId, ArchiveId, GachaType, Id, ItemId, QueryType, Time
             FROM gacha_items
             WHERE ArchiveId = ?1
             ORDER BY Id ASC",
        )?;

        let rows = stmt.query_map(params![archive_id], |row| {
            Ok(PullRecord {
                inner_id: row.get(0)?,
                archive_id: row.get(1)?,
                gacha_type: row.get(2)?,
                id: row.get(3)?,
                item_id: row.get(4)?,
                query_type: row.get(5)?,
                time: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("failed to read gacha_items row")?);
        }

        if records.is_empty() {
            return Err(ExportError::NoRecordsForUid(archive_id.to_string()).into());
        }

        Ok(records)
    }
}
