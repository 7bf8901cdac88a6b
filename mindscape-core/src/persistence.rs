//! SQLite persistence for memories and graph snapshots.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memories (
//!     id         TEXT PRIMARY KEY,
//!     agent_id   TEXT NOT NULL,
//!     created_at TEXT,
//!     active     INTEGER NOT NULL,
//!     data       TEXT NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS memory_graphs (
//!     agent_id   TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     format     TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! Graph snapshots are JSON or MessagePack inside a BLOB, with an optional
//! CRC-32 of the encoded bytes. A checksum mismatch is logged, not fatal.
//! Each snapshot records its own format so switching encodings never
//! strands older rows.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::config::{PersistenceConfig, SnapshotFormat};
use crate::error::{MindError, Result};
use crate::graph::MemoryGraph;
use crate::memory::MemoryRecord;
use crate::store::{GraphStore, MemoryStore, sort_chronologically};
use crate::types::{AgentId, MemoryId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memories (
        id         TEXT PRIMARY KEY,
        agent_id   TEXT NOT NULL,
        created_at TEXT,
        active     INTEGER NOT NULL,
        data       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS memories_by_agent ON memories (agent_id);
    CREATE TABLE IF NOT EXISTS memory_graphs (
        agent_id   TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        format     TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 / ITU-T V.42).
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// Snapshot codec
// ---------------------------------------------------------------------------

impl SnapshotFormat {
    fn tag(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }

    fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "json" => Ok(Self::Json),
            "msgpack" => Ok(Self::MessagePack),
            other => Err(MindError::Serialization(format!(
                "unknown snapshot format '{other}'"
            ))),
        }
    }

    fn encode(self, graph: &MemoryGraph) -> Result<Vec<u8>> {
        match self {
            Self::Json => {
                serde_json::to_vec(graph).map_err(|e| MindError::Serialization(e.to_string()))
            }
            Self::MessagePack => {
                rmp_serde::to_vec_named(graph).map_err(|e| MindError::Serialization(e.to_string()))
            }
        }
    }

    fn decode(self, data: &[u8]) -> Result<MemoryGraph> {
        match self {
            Self::Json => {
                serde_json::from_slice(data).map_err(|e| MindError::Serialization(e.to_string()))
            }
            Self::MessagePack => {
                rmp_serde::from_slice(data).map_err(|e| MindError::Serialization(e.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed [`MemoryStore`] and [`GraphStore`].
///
/// ```no_run
/// # use mindscape_core::persistence::SqliteStore;
/// # use mindscape_core::config::PersistenceConfig;
/// # use mindscape_core::store::GraphStore;
/// # use mindscape_core::types::AgentId;
/// let store = SqliteStore::open("mind.db", &PersistenceConfig::default())?;
/// let graph = store.load_graph(AgentId::new())?;
/// assert!(graph.is_none());
/// # Ok::<(), mindscape_core::error::MindError>(())
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns [`MindError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            format = config.format.tag(),
            "mindscape store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`MindError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Agents that have a saved graph.
    ///
    /// # Errors
    /// Returns [`MindError::Database`] on SQLite failures.
    pub fn list_agents(&self) -> Result<Vec<AgentId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT agent_id FROM memory_graphs")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut agents = Vec::new();
        for row in rows {
            let id = row?;
            match uuid::Uuid::parse_str(&id) {
                Ok(uuid) => agents.push(AgentId(uuid)),
                Err(_) => warn!(id = %id, "skipping graph row with invalid agent id"),
            }
        }
        Ok(agents)
    }

    /// Delete an agent's graph snapshot. Returns `true` if a row was removed.
    ///
    /// # Errors
    /// Returns [`MindError::Database`] on SQLite failures.
    pub fn delete_graph(&self, agent: AgentId) -> Result<bool> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM memory_graphs WHERE agent_id = ?1",
            params![agent.0.to_string()],
        )?;
        Ok(deleted > 0)
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    /// Returns [`MindError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "database backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count`. A no-op for in-memory stores.
    ///
    /// # Errors
    /// Returns [`MindError::Database`] or [`MindError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))?;
        info!(max_backups = max, "rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    /// Returns [`MindError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String =
            self.conn
                .lock()
                .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

fn decode_record(data: &str) -> Result<MemoryRecord> {
    serde_json::from_str(data).map_err(|e| MindError::Serialization(e.to_string()))
}

fn encode_record(record: &MemoryRecord) -> Result<String> {
    serde_json::to_string(record).map_err(|e| MindError::Serialization(e.to_string()))
}

impl MemoryStore for SqliteStore {
    fn all_memories(&self, agent: AgentId) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT data FROM memories WHERE agent_id = ?1")?;
        let rows = stmt.query_map(params![agent.0.to_string()], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode_record(&row?)?);
        }
        sort_chronologically(&mut records);
        Ok(records)
    }

    fn memory(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT data FROM memories WHERE id = ?1")?;
        let data: Option<String> = stmt
            .query_row(params![id.0.to_string()], |row| row.get(0))
            .optional()?;
        data.as_deref().map(decode_record).transpose()
    }

    fn append(&self, record: MemoryRecord) -> Result<()> {
        let data = encode_record(&record)?;
        self.conn.lock().execute(
            "INSERT INTO memories (id, agent_id, created_at, active, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                created_at = excluded.created_at,
                active = excluded.active,
                data = excluded.data",
            params![
                record.id.0.to_string(),
                record.agent_id.0.to_string(),
                record.created_at.map(|t| t.to_rfc3339()),
                record.is_active(),
                data
            ],
        )?;
        debug!(memory_id = %record.id, agent = %record.agent_id, "memory appended");
        Ok(())
    }

    fn update(&self, record: &MemoryRecord) -> Result<()> {
        let mut stored = self
            .memory(record.id)?
            .ok_or(MindError::MemoryNotFound(record.id))?;
        stored.set_importance(record.importance());
        stored.set_keywords(record.keywords().to_vec());
        if !record.is_active() {
            stored.deactivate();
        }
        self.append(stored)
    }

    fn soft_delete(&self, id: MemoryId) -> Result<bool> {
        let Some(mut record) = self.memory(id)? else {
            return Ok(false);
        };
        record.deactivate();
        self.append(record)?;
        Ok(true)
    }

    fn hard_delete(&self, id: MemoryId) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM memories WHERE id = ?1", params![id.0.to_string()])?;
        Ok(deleted > 0)
    }
}

impl GraphStore for SqliteStore {
    fn load_graph(&self, agent: AgentId) -> Result<Option<MemoryGraph>> {
        let start = Instant::now();
        let row: Option<(Vec<u8>, String, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT data, format, checksum FROM memory_graphs WHERE agent_id = ?1",
            )?;
            stmt.query_row(params![agent.0.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()?
        };
        let Some((data, format, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum.as_deref() {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        agent = %agent,
                        expected = %expected,
                        actual = %actual,
                        "graph checksum mismatch, snapshot may be corrupt"
                    );
                }
            }
        }

        let graph = SnapshotFormat::from_tag(&format)?.decode(&data)?;
        if graph.agent_id != agent {
            return Err(MindError::AgentMismatch {
                expected: agent,
                actual: graph.agent_id,
            });
        }
        debug!(
            agent = %agent,
            concepts = graph.concepts().len(),
            links = graph.links().len(),
            elapsed_us = start.elapsed().as_micros(),
            "graph loaded"
        );
        Ok(Some(graph))
    }

    fn save_graph(&self, graph: &MemoryGraph) -> Result<()> {
        let start = Instant::now();
        let format = self.config.format;
        let data = format.encode(graph)?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&data));

        self.conn.lock().execute(
            "INSERT INTO memory_graphs (agent_id, data, format, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(agent_id) DO UPDATE SET
                data = excluded.data,
                format = excluded.format,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![
                graph.agent_id.0.to_string(),
                data,
                format.tag(),
                Utc::now().to_rfc3339(),
                checksum
            ],
        )?;

        debug!(
            agent = %graph.agent_id,
            concepts = graph.concepts().len(),
            links = graph.links().len(),
            bytes = data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "graph saved"
        );
        Ok(())
    }
}

/// Adds `.optional()` to `rusqlite::Result`, mapping `QueryReturnedNoRows`
/// to `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::{Concept, ConceptCategory};
    use crate::memory::MemoryType;

    fn sample_graph(agent: AgentId) -> MemoryGraph {
        let now = Utc::now();
        let mut graph = MemoryGraph::new(agent, now);
        graph.insert_concept(Concept::new(
            "ocean",
            ConceptCategory::Topic,
            MemoryId::new(),
            now,
            0.5,
            0.2,
        ));
        graph
    }

    #[test]
    fn graph_round_trip_json_and_msgpack() {
        for format in [SnapshotFormat::Json, SnapshotFormat::MessagePack] {
            let store = SqliteStore::open_in_memory(&PersistenceConfig {
                format,
                ..PersistenceConfig::default()
            })
            .expect("open");
            let agent = AgentId::new();
            let graph = sample_graph(agent);
            store.save_graph(&graph).expect("save");
            let loaded = store.load_graph(agent).expect("load").expect("Some");
            assert_eq!(loaded.concepts(), graph.concepts());
        }
    }

    #[test]
    fn load_missing_graph_returns_none() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        assert!(store.load_graph(AgentId::new()).expect("load").is_none());
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let agent = AgentId::new();
        store.save_graph(&sample_graph(agent)).expect("save1");
        store
            .save_graph(&MemoryGraph::new(agent, Utc::now()))
            .expect("save2");
        let loaded = store.load_graph(agent).expect("load").expect("Some");
        assert!(loaded.concepts().is_empty());
        assert_eq!(store.list_agents().expect("list"), vec![agent]);
    }

    #[test]
    fn checksum_mismatch_still_loads() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let agent = AgentId::new();
        store.save_graph(&sample_graph(agent)).expect("save");
        store
            .conn
            .lock()
            .execute(
                "UPDATE memory_graphs SET checksum = 'deadbeef' WHERE agent_id = ?1",
                params![agent.0.to_string()],
            )
            .expect("corrupt checksum");
        let loaded = store.load_graph(agent).expect("load").expect("Some");
        assert_eq!(loaded.concepts().len(), 1);
    }

    #[test]
    fn corrupt_snapshot_is_serialization_error() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let agent = AgentId::new();
        store.save_graph(&sample_graph(agent)).expect("save");
        store
            .conn
            .lock()
            .execute(
                "UPDATE memory_graphs SET data = X'00FF' WHERE agent_id = ?1",
                params![agent.0.to_string()],
            )
            .expect("corrupt data");
        assert!(matches!(
            store.load_graph(agent),
            Err(MindError::Serialization(_))
        ));
    }

    #[test]
    fn memory_crud() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let agent = AgentId::new();
        let m = MemoryRecord::new(agent, MemoryType::Emotion, "felt calm", 4, Utc::now())
            .with_keywords(["calm"])
            .with_thread("t9");
        store.append(m.clone()).expect("append");

        let loaded = store.memory(m.id).expect("get").expect("Some");
        assert_eq!(loaded, m);
        assert_eq!(store.all_memories(agent).expect("all").len(), 1);

        assert!(store.soft_delete(m.id).expect("soft"));
        assert!(!store.memory(m.id).expect("get").expect("Some").is_active());
        assert!(store.hard_delete(m.id).expect("hard"));
        assert!(store.memory(m.id).expect("get").is_none());
    }

    #[test]
    fn file_backup_and_rotation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("mind.db");
        let config = PersistenceConfig {
            backup_count: 2,
            ..PersistenceConfig::default()
        };
        let store = SqliteStore::open(&db_path, &config).expect("open");
        let agent = AgentId::new();
        store.save_graph(&sample_graph(agent)).expect("save");

        store.create_rotating_backup().expect("backup 1");
        store.create_rotating_backup().expect("backup 2");
        store.create_rotating_backup().expect("backup 3");
        assert!(dir.path().join("mind.db.bak.1").exists());
        assert!(dir.path().join("mind.db.bak.2").exists());
        assert!(!dir.path().join("mind.db.bak.3").exists());

        let restored = SqliteStore::open(dir.path().join("mind.db.bak.1"), &config).expect("open");
        assert!(restored.load_graph(agent).expect("load").is_some());
        assert!(store.integrity_check().expect("check"));
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}
