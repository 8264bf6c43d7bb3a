//! Conflict log backed by `SQLite`

#![allow(clippy::cast_possible_wrap)] // SQLite stores versions and LIMIT as i64

use std::sync::Arc;

use crate::conflict::{ConflictContext, ConflictListener};
use crate::error::Result;
use crate::models::{ConflictRecord, ResolutionKind};
use crate::util::now_millis;
use rusqlite::{params, Connection};

use super::Database;

/// Records every merge and conflict the engine reports
///
/// Install it as the client's conflict listener to keep a queryable history,
/// the CLI reads it back with `ebb conflicts`.
#[derive(Clone)]
pub struct SqliteConflictLog {
    db: Arc<Database>,
}

impl SqliteConflictLog {
    pub const fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one entry
    pub fn record(&self, context: &ConflictContext, kind: ResolutionKind) -> Result<()> {
        let overlapping = serde_json::to_string(&context.overlapping_fields())?;
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO conflict_log (
                entity_type, entity_id, base_version, server_version, kind, overlapping_fields, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                context.entity.typename,
                context.entity.id,
                context.base.version as i64,
                context.server.version as i64,
                kind.as_str(),
                overlapping,
                now_millis(),
            ],
        )?;
        Ok(())
    }

    /// Most recent entries first
    pub fn list(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let conn = self.db.connection()?;
        Self::query(&conn, limit)
    }

    /// Delete every entry, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let conn = self.db.connection()?;
        Ok(conn.execute("DELETE FROM conflict_log", [])?)
    }

    fn query(conn: &Connection, limit: usize) -> Result<Vec<ConflictRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, base_version, server_version, kind, overlapping_fields, recorded_at
             FROM conflict_log
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?1",
        )?;

        let records = stmt
            .query_map(params![limit as i64], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Parse a record from a database row
    #[allow(clippy::cast_sign_loss)]
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
        let kind: String = row.get(5)?;
        let overlapping: String = row.get(6)?;
        Ok(ConflictRecord {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            base_version: row.get::<_, i64>(3)? as u64,
            server_version: row.get::<_, i64>(4)? as u64,
            kind: kind.parse().unwrap_or(ResolutionKind::Conflict),
            overlapping_fields: serde_json::from_str(&overlapping).unwrap_or_default(),
            recorded_at: row.get(7)?,
        })
    }

    fn record_or_warn(&self, context: &ConflictContext, kind: ResolutionKind) {
        if let Err(error) = self.record(context, kind) {
            tracing::warn!(
                "Failed to record {kind} for {} in conflict log: {error}",
                context.entity
            );
        }
    }
}

impl ConflictListener for SqliteConflictLog {
    fn conflict_occurred(&self, context: &ConflictContext) {
        self.record_or_warn(context, ResolutionKind::Conflict);
    }

    fn merge_occurred(&self, context: &ConflictContext) {
        self.record_or_warn(context, ResolutionKind::Merge);
    }
}
