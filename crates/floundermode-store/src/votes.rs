use std::path::Path;

use anyhow::{anyhow, Context, Result};
use floundermode_core::{transition, Submission, VoteEvent, VoteTransition, VoteType};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::now_rfc3339;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS votes (
  definition_id TEXT NOT NULL,
  user_id TEXT NOT NULL,
  vote_type TEXT NOT NULL CHECK (vote_type IN ('up', 'down')),
  updated_at TEXT NOT NULL,
  PRIMARY KEY (definition_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_votes_user ON votes(user_id);

CREATE TABLE IF NOT EXISTS submissions (
  submission_id TEXT PRIMARY KEY,
  term TEXT NOT NULL,
  definition TEXT NOT NULL,
  usage TEXT NOT NULL,
  related_json TEXT NOT NULL,
  author TEXT,
  submitted_at TEXT NOT NULL
);
";

/// Local vote and submission storage used by the offline backend.
pub struct SqliteVoteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSubmission {
    pub submission_id: String,
    pub submitted_at: String,
}

impl SqliteVoteStore {
    /// Open the vote database and configure runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;
        Self::configure(conn)
    }

    /// In-memory database, mainly for tests and throwaway sessions.
    ///
    /// # Errors
    /// Returns an error when the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite")?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;
        Ok(Self { conn })
    }

    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect()
        } else {
            Vec::new()
        };
        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply forward migrations up to the latest schema version.
    ///
    /// # Errors
    /// Returns an error when a migration step fails or the database is newer
    /// than this build understands.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let version = current_schema_version(&self.conn)?;
        if version == 0 {
            let tx = self.conn.transaction().context("failed to start migration transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration 001")?;
            record_schema_version(&tx, 1)?;
            tx.commit().context("failed to commit migration 001")?;
            tracing::debug!("applied vote store migration 001");
        } else if version > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }
        Ok(())
    }

    /// Record a click by `user_id` on `definition_id` and return the
    /// resulting transition. Clicking the same type twice removes the vote.
    ///
    /// # Errors
    /// Returns an error when the vote cannot be read or written.
    pub fn cast_vote(
        &mut self,
        definition_id: &str,
        user_id: &str,
        click: VoteType,
    ) -> Result<VoteTransition> {
        let tx = self.conn.transaction().context("failed to start vote transaction")?;
        let previous = tx
            .query_row(
                "SELECT vote_type FROM votes WHERE definition_id = ?1 AND user_id = ?2",
                params![definition_id, user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("failed to read existing vote")?
            .map(|raw| VoteType::parse(&raw))
            .transpose()
            .map_err(|err| anyhow!("stored vote is invalid: {err}"))?;

        let outcome = transition(previous, click);
        match outcome.current {
            Some(current) => {
                tx.execute(
                    "INSERT INTO votes(definition_id, user_id, vote_type, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(definition_id, user_id)
                     DO UPDATE SET vote_type = excluded.vote_type, updated_at = excluded.updated_at",
                    params![definition_id, user_id, current.as_str(), now_rfc3339()?],
                )
                .context("failed to upsert vote")?;
            }
            None => {
                tx.execute(
                    "DELETE FROM votes WHERE definition_id = ?1 AND user_id = ?2",
                    params![definition_id, user_id],
                )
                .context("failed to delete vote")?;
            }
        }
        tx.commit().context("failed to commit vote")?;
        Ok(outcome)
    }

    /// All live votes for the given definitions. An empty id list returns
    /// every vote.
    ///
    /// # Errors
    /// Returns an error when votes cannot be queried.
    pub fn vote_events(&self, definition_ids: &[String]) -> Result<Vec<VoteEvent>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT definition_id, user_id, vote_type FROM votes
                 ORDER BY definition_id, user_id",
            )
            .context("failed to prepare vote query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .context("failed to query votes")?;

        let mut events = Vec::new();
        for row in rows {
            let (definition_id, user_id, raw_type) = row.context("failed to read vote row")?;
            if !definition_ids.is_empty() && !definition_ids.contains(&definition_id) {
                continue;
            }
            let vote_type =
                VoteType::parse(&raw_type).map_err(|err| anyhow!("stored vote is invalid: {err}"))?;
            events.push(VoteEvent { definition_id, user_id, vote_type });
        }
        Ok(events)
    }

    /// Votes cast by one user.
    ///
    /// # Errors
    /// Returns an error when votes cannot be queried.
    pub fn user_votes(&self, user_id: &str) -> Result<Vec<VoteEvent>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT definition_id, vote_type FROM votes WHERE user_id = ?1
                 ORDER BY definition_id",
            )
            .context("failed to prepare user vote query")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("failed to query user votes")?;

        let mut events = Vec::new();
        for row in rows {
            let (definition_id, raw_type) = row.context("failed to read vote row")?;
            let vote_type =
                VoteType::parse(&raw_type).map_err(|err| anyhow!("stored vote is invalid: {err}"))?;
            events.push(VoteEvent { definition_id, user_id: user_id.to_string(), vote_type });
        }
        Ok(events)
    }

    /// Queue a visitor submission for review.
    ///
    /// # Errors
    /// Returns an error when the submission cannot be stored.
    pub fn record_submission(&mut self, submission: &Submission) -> Result<StoredSubmission> {
        let submission_id = ulid::Ulid::new().to_string();
        let submitted_at = now_rfc3339()?;
        let related_json = serde_json::to_string(&submission.related)
            .context("failed to serialize related tags")?;
        self.conn
            .execute(
                "INSERT INTO submissions(submission_id, term, definition, usage, related_json, author, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    submission_id,
                    submission.term,
                    submission.definition,
                    submission.usage,
                    related_json,
                    submission.author,
                    submitted_at,
                ],
            )
            .context("failed to insert submission")?;
        Ok(StoredSubmission { submission_id, submitted_at })
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn submission_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get::<_, i64>(0))
            .context("failed to count submissions")
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}
