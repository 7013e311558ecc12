//! SQLite history export.
//!
//! RULE: Only store.rs talks to the database.
//! RULE: Write-only. The export mirrors committed frames and journal entries
//! for outside inspection; the spine never reads it back.

use crate::{
    error::SpineResult,
    journal::JournalEntry,
    snapshot::SnapshotFrame,
    types::Tick,
};
use rusqlite::{params, Connection, OptionalExtension};

pub struct HistoryExport {
    conn: Connection,
}

impl HistoryExport {
    /// Open (or create) the export database at `path`.
    pub fn open(path: &str) -> SpineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: an inspector can read while the sim writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SpineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> SpineResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_history.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, horizon: Tick, version: &str) -> SpineResult<()> {
        let started_at = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO run (run_id, seed, horizon, version, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, seed as i64, horizon as i64, version, started_at],
        )?;
        Ok(())
    }

    // ── Snapshot frames ────────────────────────────────────────

    /// Mirror one frame. Replaces any rows already exported for the tick.
    pub fn export_frame(&self, run_id: &str, frame: &SnapshotFrame) -> SpineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM snapshot_entry WHERE run_id = ?1 AND tick = ?2",
            params![run_id, frame.tick as i64],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO snapshot_entry (run_id, tick, entity, related, domain, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in &frame.entries {
                stmt.execute(params![
                    run_id,
                    entry.tick as i64,
                    entry.entity.to_string(),
                    entry.related.map(|r| r.to_string()),
                    entry.domain().name(),
                    serde_json::to_string(&entry.payload)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── Journal ────────────────────────────────────────────────

    pub fn export_journal<'a>(
        &self,
        run_id: &str,
        entries: impl IntoIterator<Item = &'a JournalEntry>,
    ) -> SpineResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO journal_entry (run_id, tick, kind, source, target, domain, amount, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    run_id,
                    entry.tick as i64,
                    entry.kind.name(),
                    entry.source.map(|s| s.to_string()),
                    entry.target.map(|t| t.to_string()),
                    entry.domain.name(),
                    entry.amount as f64,
                    serde_json::to_string(entry)?,
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    // ── Window maintenance ─────────────────────────────────────

    /// Apply the spine's prune cutoff to the mirror.
    pub fn prune(&self, run_id: &str, cutoff: Tick) -> SpineResult<usize> {
        let frames = self.conn.execute(
            "DELETE FROM snapshot_entry WHERE run_id = ?1 AND tick < ?2",
            params![run_id, cutoff as i64],
        )?;
        let entries = self.conn.execute(
            "DELETE FROM journal_entry WHERE run_id = ?1 AND tick < ?2",
            params![run_id, cutoff as i64],
        )?;
        Ok(frames + entries)
    }

    /// Drop rows newer than `tick` after a branch.
    pub fn truncate_after(&self, run_id: &str, tick: Tick) -> SpineResult<usize> {
        let frames = self.conn.execute(
            "DELETE FROM snapshot_entry WHERE run_id = ?1 AND tick > ?2",
            params![run_id, tick as i64],
        )?;
        let entries = self.conn.execute(
            "DELETE FROM journal_entry WHERE run_id = ?1 AND tick > ?2",
            params![run_id, tick as i64],
        )?;
        Ok(frames + entries)
    }

    // ── Queries (inspection and tests) ─────────────────────────

    pub fn snapshot_entry_count(&self, run_id: &str) -> SpineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM snapshot_entry WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn journal_entry_count(&self, run_id: &str) -> SpineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM journal_entry WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// (oldest, newest) exported snapshot tick.
    pub fn snapshot_tick_range(&self, run_id: &str) -> SpineResult<Option<(Tick, Tick)>> {
        let range = self
            .conn
            .query_row(
                "SELECT MIN(tick), MAX(tick) FROM snapshot_entry WHERE run_id = ?1",
                params![run_id],
                |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()?;
        Ok(match range {
            Some((Some(lo), Some(hi))) => Some((lo as Tick, hi as Tick)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        snapshot::{SnapshotEntry, SnapshotPayload},
        types::{EntityId, ResourceType},
    };

    fn export() -> HistoryExport {
        let export = HistoryExport::in_memory().unwrap();
        export.migrate().unwrap();
        export.insert_run("r", 1, 10, "test").unwrap();
        export
    }

    fn frame(tick: Tick) -> SnapshotFrame {
        SnapshotFrame {
            tick,
            entries: vec![SnapshotEntry::new(
                tick,
                EntityId::new(0, 0),
                SnapshotPayload::VesselCargo { resource: ResourceType::Ice, amount: 2.0 },
            )],
        }
    }

    #[test]
    fn re_exporting_a_tick_replaces_it() {
        let export = export();
        export.export_frame("r", &frame(3)).unwrap();
        export.export_frame("r", &frame(3)).unwrap();
        assert_eq!(export.snapshot_entry_count("r").unwrap(), 1);
    }

    #[test]
    fn prune_and_truncate_bound_the_mirror() {
        let export = export();
        for tick in 0..10 {
            export.export_frame("r", &frame(tick)).unwrap();
        }
        export.prune("r", 4).unwrap();
        export.truncate_after("r", 7).unwrap();
        assert_eq!(export.snapshot_tick_range("r").unwrap(), Some((4, 7)));
        assert_eq!(export.snapshot_tick_range("other").unwrap(), None);
    }
}
