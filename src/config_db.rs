use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

use crate::models::job::{JobKind, JobRecord, JobStatus};
use crate::models::scoring::{Bonuses, Penalties, ScoringConfig, Thresholds, Weights};
use std::collections::{BTreeMap, BTreeSet};

const DEFAULT_TOP_RESULTS: i64 = 20;

pub struct ConfigDb {
    conn: Mutex<Connection>,
}

impl ConfigDb {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS jobs (
                job_id           TEXT PRIMARY KEY,
                inc              TEXT NOT NULL,
                window           TEXT NOT NULL DEFAULT '48h',
                kind             TEXT NOT NULL DEFAULT 'standard' CHECK(kind IN ('standard','custom','manual')),
                status           TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','running','completed','failed','cancelled')),
                progress         INTEGER NOT NULL DEFAULT 0,
                total_candidates INTEGER,
                error            TEXT,
                username         TEXT,
                search_summary   TEXT,
                created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                completed_at     TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at DESC);

            CREATE TABLE IF NOT EXISTS extractions (
                job_id     TEXT PRIMARY KEY REFERENCES jobs(job_id) ON DELETE CASCADE,
                data       TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS rankings (
                job_id       TEXT NOT NULL REFERENCES jobs(job_id) ON DELETE CASCADE,
                weights_hash TEXT NOT NULL,
                data         TEXT NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_rankings_job ON rankings(job_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS config (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Job registry ──

    pub fn create_job(
        &self,
        job_id: &str,
        inc: &str,
        window: &str,
        kind: JobKind,
        username: Option<&str>,
        search_summary: Option<&str>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (job_id, inc, window, kind, username, search_summary) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![job_id, inc, window, kind.as_str(), username, search_summary],
        )?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> anyhow::Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT job_id, inc, window, kind, status, progress, total_candidates, error, \
                    username, search_summary, created_at, completed_at \
             FROM jobs WHERE job_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![job_id], row_to_job)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list_jobs(&self, limit: u32) -> anyhow::Result<Vec<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT job_id, inc, window, kind, status, progress, total_candidates, error, \
                    username, search_summary, created_at, completed_at \
             FROM jobs ORDER BY created_at DESC, job_id LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: Option<i64>,
        total_candidates: Option<i64>,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let terminal = matches!(
            status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        );
        conn.execute(
            "UPDATE jobs SET status = ?2, \
                 progress = COALESCE(?3, progress), \
                 total_candidates = COALESCE(?4, total_candidates), \
                 error = COALESCE(?5, error), \
                 completed_at = CASE WHEN ?6 THEN strftime('%Y-%m-%dT%H:%M:%SZ','now') ELSE completed_at END \
             WHERE job_id = ?1",
            params![job_id, status.as_str(), progress, total_candidates, error, terminal],
        )?;
        Ok(())
    }

    pub fn delete_job(&self, job_id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])?;
        Ok(count > 0)
    }

    // ── Extraction blobs ──

    pub fn save_extraction(&self, job_id: &str, data: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO extractions (job_id, data) VALUES (?1, ?2) \
             ON CONFLICT(job_id) DO UPDATE SET data = excluded.data",
            params![job_id, data],
        )?;
        Ok(())
    }

    pub fn get_extraction(&self, job_id: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let data = conn
            .query_row(
                "SELECT data FROM extractions WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    // ── Rankings, keyed by (job, weights hash, creation time) ──

    pub fn save_ranking(&self, job_id: &str, weights_hash: &str, data: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rankings (job_id, weights_hash, data) VALUES (?1, ?2, ?3)",
            params![job_id, weights_hash, data],
        )?;
        Ok(())
    }

    pub fn get_latest_ranking(&self, job_id: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let data = conn
            .query_row(
                "SELECT data FROM rankings WHERE job_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    // ── Config KV blobs ──

    pub fn get_config(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_config(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_config_as<T: serde::de::DeserializeOwned + Default>(
        &self,
        key: &str,
    ) -> anyhow::Result<T> {
        match self.get_config(key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(T::default()),
        }
    }

    fn set_config_from<T: serde::Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set_config(key, &serde_json::to_string(value)?)
    }

    pub fn weights(&self) -> anyhow::Result<Weights> {
        self.get_config_as("weights")
    }

    pub fn set_weights(&self, weights: &Weights) -> anyhow::Result<()> {
        self.set_config_from("weights", weights)
    }

    pub fn penalties(&self) -> anyhow::Result<Penalties> {
        self.get_config_as("penalties")
    }

    pub fn set_penalties(&self, penalties: &Penalties) -> anyhow::Result<()> {
        self.set_config_from("penalties", penalties)
    }

    pub fn bonuses(&self) -> anyhow::Result<Bonuses> {
        self.get_config_as("bonuses")
    }

    pub fn set_bonuses(&self, bonuses: &Bonuses) -> anyhow::Result<()> {
        self.set_config_from("bonuses", bonuses)
    }

    pub fn thresholds(&self) -> anyhow::Result<Thresholds> {
        self.get_config_as("thresholds")
    }

    pub fn set_thresholds(&self, thresholds: &Thresholds) -> anyhow::Result<()> {
        self.set_config_from("thresholds", thresholds)
    }

    pub fn service_synonyms(&self) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        match self.get_config("service_synonyms")? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(crate::models::scoring::default_synonyms()),
        }
    }

    pub fn set_service_synonyms(
        &self,
        synonyms: &BTreeMap<String, Vec<String>>,
    ) -> anyhow::Result<()> {
        self.set_config_from("service_synonyms", synonyms)
    }

    pub fn related_groups(&self) -> anyhow::Result<BTreeMap<String, BTreeSet<String>>> {
        match self.get_config("related_groups")? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(crate::models::scoring::default_groups()),
        }
    }

    pub fn set_related_groups(
        &self,
        groups: &BTreeMap<String, BTreeSet<String>>,
    ) -> anyhow::Result<()> {
        self.set_config_from("related_groups", groups)
    }

    pub fn top_results(&self) -> anyhow::Result<i64> {
        match self.get_config("top_results")? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(DEFAULT_TOP_RESULTS),
        }
    }

    pub fn set_top_results(&self, top: i64) -> anyhow::Result<()> {
        self.set_config_from("top_results", &top)
    }

    /// Assemble the full scoring configuration from the stored blobs.
    /// Passed by value into jobs; a later config write never mutates an
    /// in-flight run.
    pub fn scoring_config(&self) -> anyhow::Result<ScoringConfig> {
        Ok(ScoringConfig {
            weights: self.weights()?,
            thresholds: self.thresholds()?,
            penalties: self.penalties()?,
            bonuses: self.bonuses()?,
            service_synonyms: self.service_synonyms()?,
            related_groups: self.related_groups()?,
        })
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(JobRecord {
        job_id: row.get(0)?,
        inc: row.get(1)?,
        window: row.get(2)?,
        kind: JobKind::parse(&kind).unwrap_or(JobKind::Standard),
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        progress: row.get(5)?,
        total_candidates: row.get(6)?,
        error: row.get(7)?,
        username: row.get(8)?,
        search_summary: row.get(9)?,
        created_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}
