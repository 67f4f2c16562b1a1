//! SQLite-backed store.
//!
//! Three tables:
//! - `candidates`: discovered projects, upserted by `(name, category)`
//! - `completed_projects`: append-only completion markers
//! - `mined_items`: item ids per project, primary key on both columns

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use crate::domain::CandidateProject;
use crate::error::{MinerError, Result};
use crate::store::{CompletionStore, ItemStore};

/// SQLite store shared by the controller and the mining workers.
///
/// `rusqlite::Connection` isn't `Sync`, so it lives behind a `Mutex`;
/// statements are short and need exclusive access anyway.
pub struct MinerStore {
    db_path: PathBuf,
    db: Mutex<Connection>,
}

impl std::fmt::Debug for MinerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinerStore").field("db_path", &self.db_path).finish_non_exhaustive()
    }
}

impl MinerStore {
    /// Open or create the store under `base_dir` (`<base_dir>/miner.db`).
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)?;
        let db_path = base_dir.join("miner.db");
        let db = Connection::open(&db_path)?;
        Self::init_schema(&db)?;

        tracing::debug!(path = %db_path.display(), "Opened miner store");
        Ok(Self {
            db_path,
            db: Mutex::new(db),
        })
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            db: Mutex::new(db),
        })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                source_urls TEXT NOT NULL,
                size_hint INTEGER,
                discovered_at INTEGER NOT NULL,
                PRIMARY KEY (name, category)
            );

            CREATE TABLE IF NOT EXISTS completed_projects (
                name TEXT PRIMARY KEY,
                completed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mined_items (
                project TEXT NOT NULL,
                item_id TEXT NOT NULL,
                mined_at INTEGER NOT NULL,
                PRIMARY KEY (project, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_candidates_category ON candidates(category);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| MinerError::Storage(e.to_string()))
    }

    /// Insert or refresh candidates. A missing size hint never erases a stored one.
    pub fn upsert_candidates(&self, candidates: &[CandidateProject]) -> Result<usize> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let now = now_ms();
        for candidate in candidates {
            tx.execute(
                r#"
                INSERT INTO candidates (name, category, source_urls, size_hint, discovered_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(name, category) DO UPDATE SET
                    source_urls = excluded.source_urls,
                    size_hint = COALESCE(excluded.size_hint, candidates.size_hint)
                "#,
                params![
                    candidate.name,
                    candidate.category.as_str(),
                    serde_json::to_string(&candidate.source_urls)?,
                    candidate.size_hint.map(|h| h as i64),
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(candidates.len())
    }

    /// All candidates, ordered by category then name.
    pub fn all_candidates(&self) -> Result<Vec<CandidateProject>> {
        let db = self.conn()?;
        let mut stmt =
            db.prepare("SELECT name, category, source_urls, size_hint FROM candidates ORDER BY category, name")?;
        let rows = stmt.query_map([], read_candidate_row)?;
        collect_candidates(rows)
    }

    /// Look up one candidate by name (first match across categories).
    pub fn candidate(&self, name: &str) -> Result<Option<CandidateProject>> {
        let db = self.conn()?;
        let row = db
            .query_row(
                "SELECT name, category, source_urls, size_hint FROM candidates WHERE name = ?1 ORDER BY category LIMIT 1",
                [name],
                read_candidate_row,
            )
            .optional()?;
        row.map(into_candidate).transpose()
    }
}

type CandidateRow = (String, String, String, Option<i64>);

fn read_candidate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CandidateRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_candidate((name, category, urls, hint): CandidateRow) -> Result<CandidateProject> {
    Ok(CandidateProject {
        name,
        category: category.parse()?,
        source_urls: serde_json::from_str(&urls)?,
        size_hint: hint.map(|h| h.max(0) as u64),
    })
}

fn collect_candidates(
    rows: impl Iterator<Item = rusqlite::Result<CandidateRow>>,
) -> Result<Vec<CandidateProject>> {
    let mut candidates = Vec::new();
    for row in rows {
        candidates.push(into_candidate(row?)?);
    }
    Ok(candidates)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl CompletionStore for MinerStore {
    fn completed_project_names(&self) -> Result<HashSet<String>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT name FROM completed_projects")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(names)
    }

    fn mark_project_completed(&self, name: &str) -> Result<bool> {
        let db = self.conn()?;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO completed_projects (name, completed_at) VALUES (?1, ?2)",
            params![name, now_ms()],
        )?;
        Ok(inserted == 1)
    }
}

impl ItemStore for MinerStore {
    fn existing_item_ids(&self, project: &str) -> Result<HashSet<String>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT item_id FROM mined_items WHERE project = ?1")?;
        let ids = stmt
            .query_map([project], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    fn save_items(&self, project: &str, ids: &[String]) -> Result<usize> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let now = now_ms();
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO mined_items (project, item_id, mined_at) VALUES (?1, ?2, ?3)")?;
            for id in ids {
                inserted += stmt.execute(params![project, id, now])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use tempfile::TempDir;

    fn create_temp_store() -> (MinerStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = MinerStore::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_completion_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = MinerStore::open_at(temp_dir.path()).unwrap();
            assert!(store.mark_project_completed("kafka").unwrap());
        }

        let store = MinerStore::open_at(temp_dir.path()).unwrap();
        let names = store.completed_project_names().unwrap();
        assert_eq!(names.len(), 1);
        assert!(names.contains("kafka"));
    }

    #[test]
    fn test_mark_completed_twice_is_noop() {
        let (store, _dir) = create_temp_store();
        assert!(store.mark_project_completed("kafka").unwrap());
        assert!(!store.mark_project_completed("kafka").unwrap());
        assert_eq!(store.completed_project_names().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_and_query_candidates() {
        let (store, _dir) = create_temp_store();
        let candidates = vec![
            CandidateProject::new("kafka", Category::Java, "https://github.com/apache/kafka").with_size_hint(12000),
            CandidateProject::new("arrow", Category::Cpp, "https://github.com/apache/arrow"),
            CandidateProject::new("airflow", Category::Python, "https://github.com/apache/airflow"),
        ];
        assert_eq!(store.upsert_candidates(&candidates).unwrap(), 3);

        let all = store.all_candidates().unwrap();
        assert_eq!(all.len(), 3);

        assert_eq!(all[0].name, "arrow");
        assert_eq!(all[0].category, Category::Cpp);
        assert_eq!(all[0].size_hint, None);

        let kafka = store.candidate("kafka").unwrap().unwrap();
        assert_eq!(kafka.size_hint, Some(12000));
        assert_eq!(kafka.source_urls, vec!["https://github.com/apache/kafka".to_string()]);

        assert!(store.candidate("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_existing_size_hint() {
        let (store, _dir) = create_temp_store();
        store
            .upsert_candidates(&[CandidateProject::new("kafka", Category::Java, "u1").with_size_hint(10)])
            .unwrap();
        store
            .upsert_candidates(&[CandidateProject::new("kafka", Category::Java, "u2")])
            .unwrap();

        let kafka = store.candidate("kafka").unwrap().unwrap();
        assert_eq!(kafka.size_hint, Some(10));
        assert_eq!(kafka.primary_source(), Some("u2"));
        assert_eq!(store.all_candidates().unwrap().len(), 1);
    }

    #[test]
    fn test_items_deduplicated_per_project() {
        let store = MinerStore::open_in_memory().unwrap();
        let batch = vec!["a1".to_string(), "a2".to_string()];
        assert_eq!(store.save_items("kafka", &batch).unwrap(), 2);
        assert_eq!(store.save_items("kafka", &batch).unwrap(), 0);
        assert_eq!(store.save_items("arrow", &batch).unwrap(), 2);

        let ids = store.existing_item_ids("kafka").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a1"));
    }
}
