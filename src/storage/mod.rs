//! Persistent storage
//!
//! This module provides:
//! - OS-standard data and config directory locations (via `directories`)
//! - The `MatchHistoryStore` collaborator with SQLite and in-memory backends
//! - Client settings persisted as JSON

pub mod settings;

use crate::game::engine::RoundResult;
use crate::stats::{MatchRecord, PlayerStats, StatsTracker};
use directories::ProjectDirs;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current schema version. Bump this when making schema changes.
/// Version history:
/// - v1: matches and match_players tables
/// - v2: round_results table
const SCHEMA_VERSION: u32 = 2;

const APP_NAME: &str = "lettermatch";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("could not determine data directory")]
    NoDataDirectory,
    #[error("database schema version {found} is newer than supported version {supported}")]
    FutureSchemaVersion { found: u32, supported: u32 },
    #[error("failed to create data directory: {0}")]
    CreateDirFailed(std::io::Error),
    #[error("migration from v{from} to v{to} failed: {reason}")]
    MigrationFailed { from: u32, to: u32, reason: String },
    #[error("corrupt stored record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// OS-standard data directory:
/// - Linux: `$XDG_DATA_HOME/lettermatch/` or `~/.local/share/lettermatch/`
/// - macOS: `~/Library/Application Support/lettermatch/`
pub fn data_dir() -> Result<PathBuf, StorageError> {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDirectory)
}

pub fn config_dir() -> Result<PathBuf, StorageError> {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(StorageError::NoDataDirectory)
}

/// Match history collaborator used by the server.
pub trait MatchHistoryStore: Send + Sync {
    fn record_round_result(&self, match_id: &str, result: &RoundResult) -> Result<(), StorageError>;

    fn record_match_result(&self, record: &MatchRecord) -> Result<(), StorageError>;

    /// Stats by player id, or by display name when no id matches
    fn player_stats(&self, player: &str) -> Result<Option<PlayerStats>, StorageError>;

    fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerStats>, StorageError>;
}

/// History kept for the life of the process
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    inner: Mutex<MemoryHistory>,
}

#[derive(Debug, Default)]
struct MemoryHistory {
    matches: Vec<MatchRecord>,
    rounds: Vec<(String, RoundResult)>,
    tracker: StatsTracker,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self) -> Vec<MatchRecord> {
        self.inner.lock().matches.clone()
    }

    #[cfg(test)]
    pub fn rounds_for(&self, match_id: &str) -> Vec<RoundResult> {
        self.inner
            .lock()
            .rounds
            .iter()
            .filter(|(id, _)| id == match_id)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

impl MatchHistoryStore for MemoryHistoryStore {
    fn record_round_result(&self, match_id: &str, result: &RoundResult) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.tracker.process_round(result);
        inner.rounds.push((match_id.to_string(), result.clone()));
        Ok(())
    }

    fn record_match_result(&self, record: &MatchRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.tracker.process_match(record);
        inner.matches.push(record.clone());
        Ok(())
    }

    fn player_stats(&self, player: &str) -> Result<Option<PlayerStats>, StorageError> {
        Ok(self.inner.lock().tracker.find(player).cloned())
    }

    fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerStats>, StorageError> {
        Ok(self.inner.lock().tracker.leaderboard(limit))
    }
}

/// SQLite-backed history. Stats are rebuilt by replaying stored records.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open or create `lettermatch.db` in the OS data directory.
    pub fn open_default() -> Result<Self, StorageError> {
        let data_dir = data_dir()?;
        std::fs::create_dir_all(&data_dir).map_err(StorageError::CreateDirFailed)?;
        Self::open(&data_dir.join("lettermatch.db"))
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StorageError::CreateDirFailed)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Replay every stored round and match, in insertion order.
    fn replay(&self) -> Result<StatsTracker, StorageError> {
        let conn = self.conn.lock();
        let mut tracker = StatsTracker::new();

        let mut stmt = conn.prepare("SELECT payload FROM round_results ORDER BY id")?;
        let rounds = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for payload in rounds {
            let result: RoundResult = serde_json::from_str(&payload?)?;
            tracker.process_round(&result);
        }

        let mut stmt = conn.prepare("SELECT payload FROM matches ORDER BY finished_at, match_id")?;
        let matches = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for payload in matches {
            let record: MatchRecord = serde_json::from_str(&payload?)?;
            tracker.process_match(&record);
        }

        Ok(tracker)
    }

    pub fn match_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl MatchHistoryStore for SqliteHistoryStore {
    fn record_round_result(&self, match_id: &str, result: &RoundResult) -> Result<(), StorageError> {
        let payload = serde_json::to_string(result)?;
        self.conn.lock().execute(
            "INSERT INTO round_results (match_id, round_number, payload) VALUES (?1, ?2, ?3)",
            params![match_id, result.round_number, payload],
        )?;
        Ok(())
    }

    fn record_match_result(&self, record: &MatchRecord) -> Result<(), StorageError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO matches (match_id, ranked, winner_player_id, forfeited, finished_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.match_id,
                record.ranked,
                record.winner_player_id,
                record.forfeited,
                record.finished_at_ms as i64,
                payload
            ],
        )?;
        for player in &record.players {
            tx.execute(
                "INSERT OR REPLACE INTO match_players (match_id, player_id, display_name, score)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.match_id, player.player_id, player.display_name, player.score],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn player_stats(&self, player: &str) -> Result<Option<PlayerStats>, StorageError> {
        Ok(self.replay()?.find(player).cloned())
    }

    fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerStats>, StorageError> {
        Ok(self.replay()?.leaderboard(limit))
    }
}

// === Schema ===

fn initialize_schema(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        migrate_schema(conn, 1)?;
    } else if current_version < SCHEMA_VERSION {
        migrate_schema(conn, current_version)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(StorageError::FutureSchemaVersion {
            found: current_version,
            supported: SCHEMA_VERSION,
        });
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, StorageError> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='meta'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version: u32 = conn
        .query_row("SELECT schema_version FROM meta LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn create_schema_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE meta (
            schema_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Full record kept as JSON; columns exist for querying
        CREATE TABLE matches (
            match_id TEXT PRIMARY KEY,
            ranked INTEGER NOT NULL,
            winner_player_id TEXT,
            forfeited INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE TABLE match_players (
            match_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            score INTEGER NOT NULL,
            PRIMARY KEY (match_id, player_id)
        );

        CREATE INDEX idx_match_players_player ON match_players (player_id);
        "#,
    )?;

    let created_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    conn.execute(
        "INSERT INTO meta (schema_version, created_at) VALUES (?1, ?2)",
        params![1, created_at],
    )?;
    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: u32) -> Result<(), StorageError> {
    let mut current_version = from_version;

    while current_version < SCHEMA_VERSION {
        match current_version {
            1 => {
                migrate_v1_to_v2(conn)?;
                current_version = 2;
            }
            _ => {
                return Err(StorageError::MigrationFailed {
                    from: current_version,
                    to: SCHEMA_VERSION,
                    reason: format!("no migration path from version {}", current_version),
                });
            }
        }
    }

    conn.execute("UPDATE meta SET schema_version = ?1", params![SCHEMA_VERSION])?;
    Ok(())
}

/// v2: per-round results, used for longest-word stats
fn migrate_v1_to_v2(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS round_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id TEXT NOT NULL,
            round_number INTEGER NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_round_results_match ON round_results (match_id);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::{RoundDetails, SubmissionRecord};
    use crate::game::validation::WordValidationResult;
    use crate::game::RoundType;
    use crate::stats::MatchParticipantRecord;
    use std::collections::BTreeMap;

    fn record(id: &str, a: u32, b: u32, at: u64) -> MatchRecord {
        let winner = match a.cmp(&b) {
            std::cmp::Ordering::Greater => Some("pa".to_string()),
            std::cmp::Ordering::Less => Some("pb".to_string()),
            std::cmp::Ordering::Equal => None,
        };
        MatchRecord {
            match_id: id.to_string(),
            ranked: false,
            players: vec![
                MatchParticipantRecord {
                    player_id: "pa".to_string(),
                    display_name: "Ada".to_string(),
                    score: a,
                },
                MatchParticipantRecord {
                    player_id: "pb".to_string(),
                    display_name: "Bea".to_string(),
                    score: b,
                },
            ],
            winner_player_id: winner,
            forfeited: false,
            finished_at_ms: at,
        }
    }

    fn letters_round(player: &str, word: &str) -> RoundResult {
        RoundResult {
            round_number: 1,
            round_type: RoundType::Letters,
            awarded_scores: BTreeMap::from([(player.to_string(), word.len() as u32)]),
            details: RoundDetails::Letters {
                letters: "CARNATION".chars().collect(),
                submissions: vec![SubmissionRecord {
                    player_id: player.to_string(),
                    submitted: true,
                    result: WordValidationResult {
                        normalized_word: word.to_string(),
                        is_valid: true,
                        failure_kind: None,
                        score: word.len() as u32,
                    },
                }],
            },
        }
    }

    fn exercise(store: &dyn MatchHistoryStore) {
        store.record_round_result("m1", &letters_round("pa", "nation")).unwrap();
        store.record_match_result(&record("m1", 30, 12, 1)).unwrap();
        store.record_match_result(&record("m2", 8, 8, 2)).unwrap();
        store.record_match_result(&record("m3", 2, 40, 3)).unwrap();
        store.record_match_result(&record("m4", 20, 1, 4)).unwrap();

        let ada = store.player_stats("pa").unwrap().unwrap();
        assert_eq!((ada.matches_played, ada.wins, ada.losses, ada.draws), (4, 2, 1, 1));
        assert_eq!(ada.total_points, 60);
        assert_eq!(ada.longest_word, "nation");

        let bea = store.player_stats("bea").unwrap().unwrap();
        assert_eq!(bea.player_id, "pb");
        assert!(store.player_stats("nobody").unwrap().is_none());

        let board: Vec<String> = store
            .leaderboard(10)
            .unwrap()
            .into_iter()
            .map(|s| s.player_id)
            .collect();
        assert_eq!(board, vec!["pa", "pb"]);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryHistoryStore::new();
        exercise(&store);
        assert_eq!(store.matches().len(), 4);
        assert_eq!(store.rounds_for("m1").len(), 1);
    }

    #[test]
    fn test_sqlite_store() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        exercise(&store);
        assert_eq!(store.match_count().unwrap(), 4);
    }

    #[test]
    fn test_sqlite_store_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("lettermatch-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("history.db");
        {
            let store = SqliteHistoryStore::open(&path).unwrap();
            store.record_match_result(&record("m1", 9, 3, 1)).unwrap();
        }
        let store = SqliteHistoryStore::open(&path).unwrap();
        assert_eq!(store.player_stats("pa").unwrap().unwrap().wins, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_schema_version_is_current() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let version: u32 = store
            .conn
            .lock()
            .query_row("SELECT schema_version FROM meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrates_v1_database() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);

        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let has_rounds: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='round_results'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(has_rounds);
    }

    #[test]
    fn test_future_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute("UPDATE meta SET schema_version = 99", []).unwrap();
        assert!(matches!(
            initialize_schema(&conn),
            Err(StorageError::FutureSchemaVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_data_dir() {
        if let Ok(path) = data_dir() {
            assert!(path.to_string_lossy().contains(APP_NAME));
        }
    }
}
