use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::engine::Interaction;
use crate::error::Result;
use crate::models::LearnerProfile;
use crate::snapshot;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerRow {
    pub learner_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub interactions: i64,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS learners (
                learner_id TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Raw interaction history, kept beside the snapshot for auditing
            CREATE TABLE IF NOT EXISTS interaction_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                learner_id TEXT NOT NULL,
                concept_id TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                learner_answer TEXT NOT NULL,
                expected_answer TEXT NOT NULL,
                session_id TEXT NOT NULL,
                mode TEXT NOT NULL CHECK(mode IN ('learn', 'practice', 'review', 'debug')),
                recorded_at TEXT NOT NULL,
                FOREIGN KEY (learner_id) REFERENCES learners(learner_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_interaction_log_learner ON interaction_log(learner_id);
            CREATE INDEX IF NOT EXISTS idx_interaction_log_concept ON interaction_log(learner_id, concept_id);
            "#,
        )?;
        Ok(())
    }

    /// Load a learner's profile. Unknown learners start empty, and so do
    /// learners whose stored snapshot no longer parses.
    pub fn load_profile(&self, learner_id: &str) -> Result<LearnerProfile> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot FROM learners WHERE learner_id = ?1",
                params![learner_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match stored {
            Some(text) => snapshot::deserialize(learner_id, &text),
            None => {
                debug!(learner_id, "no stored profile, starting fresh");
                LearnerProfile::new(learner_id)
            }
        })
    }

    pub fn save_profile(&self, profile: &LearnerProfile) -> Result<()> {
        let text = snapshot::serialize(profile)?;
        self.save_snapshot(&profile.learner_id, &text)
    }

    /// Store a raw snapshot string as-is, without parsing it.
    pub fn save_snapshot(&self, learner_id: &str, text: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO learners (learner_id, snapshot, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(learner_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
            params![learner_id, text, now],
        )?;
        Ok(())
    }

    pub fn log_interaction(
        &self,
        learner_id: &str,
        interaction: &Interaction,
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO interaction_log
                (learner_id, concept_id, is_correct, learner_answer, expected_answer,
                 session_id, mode, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                learner_id,
                interaction.concept_id.trim(),
                interaction.is_correct,
                interaction.learner_answer,
                interaction.expected_answer,
                interaction.session_id,
                interaction.mode.as_str(),
                recorded_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn interaction_count(&self, learner_id: &str, concept_id: Option<&str>) -> Result<i64> {
        let count = match concept_id {
            Some(concept) => self.conn.query_row(
                "SELECT COUNT(*) FROM interaction_log WHERE learner_id = ?1 AND concept_id = ?2",
                params![learner_id, concept],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM interaction_log WHERE learner_id = ?1",
                params![learner_id],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }

    pub fn list_learners(&self) -> Result<Vec<LearnerRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT l.learner_id, l.created_at, l.updated_at, COUNT(i.id) AS interactions
            FROM learners l
            LEFT JOIN interaction_log i ON l.learner_id = i.learner_id
            GROUP BY l.learner_id, l.created_at, l.updated_at
            ORDER BY l.learner_id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(LearnerRow {
                learner_id: row.get(0)?,
                created_at: row.get(1)?,
                updated_at: row.get(2)?,
                interactions: row.get(3)?,
            })
        })?;
        let learners = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(learners)
    }
}
