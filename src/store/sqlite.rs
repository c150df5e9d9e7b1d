use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use uuid::Uuid;

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const IDENTITY_COLUMNS: &str =
    "id, github_id, handle, email, avatar_url, name, role, created_at, updated_at";

const REPOSITORY_COLUMNS: &str = "id, owner_id, github_repo_id, name, full_name, description, private, html_url, created_at, updated_at";

const RUN_COLUMNS: &str = "id, user_id, repository_id, energy_micros, co2_micros, duration_millis, run_metadata, git_commit_sha, branch_name, workflow_name, created_at";

/// Repository columns, owner summary and the run rollup. Callers append the
/// WHERE/GROUP BY tail.
const STATS_SELECT: &str = "SELECT r.id, r.owner_id, r.github_repo_id, r.name, r.full_name, r.description,
        r.private, r.html_url, r.created_at, r.updated_at,
        u.handle, u.avatar_url,
        COALESCE(SUM(x.co2_micros), 0) AS total_co2,
        COALESCE(AVG(x.co2_micros), 0.0) AS avg_co2,
        COALESCE(SUM(x.energy_micros), 0) AS total_energy,
        COALESCE(AVG(x.energy_micros), 0.0) AS avg_energy,
        COUNT(x.id) AS run_count,
        COALESCE(MAX(x.created_at), r.created_at) AS last_run_at
     FROM repositories r
     JOIN users u ON u.id = r.owner_id
     LEFT JOIN runs x ON x.repository_id = r.id";

const REPOSITORY_FILTER: &str = "(?1 IS NULL OR u.handle = ?1 COLLATE NOCASE)
     AND (?2 IS NULL OR r.name LIKE ?2 ESCAPE '\\')";

const RUN_FILTER: &str = "(?1 IS NULL OR user_id = ?1)
     AND (?2 IS NULL OR repository_id = ?2)
     AND (?3 IS NULL OR created_at >= ?3)
     AND (?4 IS NULL OR created_at <= ?4)";

/// SQLite-backed store. A single connection guarded by a mutex serves all
/// requests; SQLite serializes writers anyway, and immediate transactions keep
/// concurrent ingestion of the same repository from racing.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query_runs(
        &self,
        owner_id: Option<&str>,
        repository_id: Option<&str>,
        query: &RunQuery,
    ) -> Result<Page<Run>> {
        let conn = self.conn();
        let from = query.from.as_ref().map(format_datetime);
        let to = query.to.as_ref().map(format_datetime);

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM runs WHERE {RUN_FILTER}"),
            params![owner_id, repository_id, from, to],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE {RUN_FILTER}
             ORDER BY created_at DESC, id DESC LIMIT ?5 OFFSET ?6"
        ))?;
        let rows = stmt.query_map(
            params![
                owner_id,
                repository_id,
                from,
                to,
                query.page.limit,
                query.page.offset()
            ],
            run_from_row,
        )?;

        Ok(Page {
            items: rows.collect::<rusqlite::Result<Vec<_>>>()?,
            total,
        })
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width UTC timestamps so text comparison matches chronological order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('%');
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn conversion_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    let role: String = row.get(6)?;
    Ok(Identity {
        id: row.get(0)?,
        github_id: row.get(1)?,
        handle: row.get(2)?,
        email: row.get(3)?,
        avatar_url: row.get(4)?,
        name: row.get(5)?,
        role: role.parse().map_err(|e: String| conversion_error(6, e))?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        github_repo_id: row.get(2)?,
        name: row.get(3)?,
        full_name: row.get(4)?,
        description: row.get(5)?,
        private: row.get(6)?,
        html_url: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    let metadata: Option<String> = row.get(6)?;
    let run_metadata = metadata
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .map_err(|e| conversion_error(6, e))?;

    Ok(Run {
        id: row.get(0)?,
        user_id: row.get(1)?,
        repository_id: row.get(2)?,
        energy_kwh: Micros::from_raw(row.get(3)?),
        co2_kg: Micros::from_raw(row.get(4)?),
        duration_s: Millis::from_raw(row.get(5)?),
        run_metadata,
        git_commit_sha: row.get(7)?,
        branch_name: row.get(8)?,
        workflow_name: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<RepositoryWithStats> {
    let avg_co2: f64 = row.get(13)?;
    let avg_energy: f64 = row.get(15)?;
    let repository = repository_from_row(row)?;

    Ok(RepositoryWithStats {
        owner: OwnerSummary {
            id: repository.owner_id.clone(),
            handle: row.get(10)?,
            avatar_url: row.get(11)?,
        },
        stats: RunAggregate {
            total_co2_kg: Micros::from_raw(row.get(12)?),
            avg_co2_kg: avg_co2 / 1_000_000.0,
            total_energy_kwh: Micros::from_raw(row.get(14)?),
            avg_energy_kwh: avg_energy / 1_000_000.0,
            run_count: row.get(16)?,
            last_run_at: parse_datetime(&row.get::<_, String>(17)?),
        },
        repository,
    })
}

/// Finds the repository by GitHub id, then by (owner, full name), creating it
/// when neither matches. Must run inside the caller's transaction.
fn upsert_repository_tx(
    tx: &Transaction<'_>,
    owner_id: &str,
    input: &RepositoryInput,
    now: &str,
) -> Result<Repository> {
    if let Some(github_repo_id) = input.github_repo_id {
        let existing = tx
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE github_repo_id = ?1"),
                params![github_repo_id],
                repository_from_row,
            )
            .optional()?;

        if let Some(existing) = existing {
            if existing.owner_id != owner_id {
                return Err(Error::Conflict(
                    "repository is registered to another owner".to_string(),
                ));
            }
            return tx
                .query_row(
                    &format!(
                        "UPDATE repositories
                         SET name = ?2, full_name = ?3, description = ?4, private = ?5,
                             html_url = ?6, updated_at = ?7
                         WHERE id = ?1
                         RETURNING {REPOSITORY_COLUMNS}"
                    ),
                    params![
                        existing.id,
                        input.name,
                        input.full_name,
                        input.description,
                        input.private,
                        input.html_url,
                        now,
                    ],
                    repository_from_row,
                )
                .map_err(|e| Error::from_sqlite(e, "repository full name already in use"));
        }
    }

    tx.query_row(
        &format!(
            "INSERT INTO repositories
                 (id, owner_id, github_repo_id, name, full_name, description, private, html_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(owner_id, full_name) DO UPDATE SET
                 github_repo_id = COALESCE(repositories.github_repo_id, excluded.github_repo_id),
                 name = excluded.name,
                 description = excluded.description,
                 private = excluded.private,
                 html_url = excluded.html_url,
                 updated_at = excluded.updated_at
             RETURNING {REPOSITORY_COLUMNS}"
        ),
        params![
            Uuid::new_v4().to_string(),
            owner_id,
            input.github_repo_id,
            input.name,
            input.full_name,
            input.description,
            input.private,
            input.html_url,
            now,
        ],
        repository_from_row,
    )
    .map_err(|e| Error::from_sqlite(e, "repository id already registered"))
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Identity operations

    fn upsert_identity(&self, profile: &ProviderProfile) -> Result<Identity> {
        let now = format_datetime(&Utc::now());
        self.conn()
            .query_row(
                &format!(
                    "INSERT INTO users (id, github_id, handle, email, avatar_url, name, role, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'user', ?7, ?7)
                     ON CONFLICT(github_id) DO UPDATE SET
                         handle = excluded.handle,
                         email = excluded.email,
                         avatar_url = excluded.avatar_url,
                         name = excluded.name,
                         updated_at = excluded.updated_at
                     RETURNING {IDENTITY_COLUMNS}"
                ),
                params![
                    Uuid::new_v4().to_string(),
                    profile.github_id,
                    profile.handle,
                    profile.email,
                    profile.avatar_url,
                    profile.name,
                    now,
                ],
                identity_from_row,
            )
            .map_err(Error::from)
    }

    fn get_identity(&self, id: &str) -> Result<Option<Identity>> {
        self.conn()
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                identity_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_identity_by_github_id(&self, github_id: i64) -> Result<Option<Identity>> {
        self.conn()
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE github_id = ?1"),
                params![github_id],
                identity_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_identity_by_handle(&self, handle: &str) -> Result<Option<Identity>> {
        // Handles can move between GitHub accounts; prefer the freshest profile.
        self.conn()
            .query_row(
                &format!(
                    "SELECT {IDENTITY_COLUMNS} FROM users WHERE handle = ?1 COLLATE NOCASE
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![handle],
                identity_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_identities(&self, page: PageRequest) -> Result<Page<Identity>> {
        let conn = self.conn();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users ORDER BY created_at DESC, id LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![page.limit, page.offset()], identity_from_row)?;

        Ok(Page {
            items: rows.collect::<rusqlite::Result<Vec<_>>>()?,
            total,
        })
    }

    fn set_identity_role(&self, id: &str, role: Role) -> Result<Option<Identity>> {
        self.conn()
            .query_row(
                &format!(
                    "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1
                     RETURNING {IDENTITY_COLUMNS}"
                ),
                params![id, role.as_str(), format_datetime(&Utc::now())],
                identity_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn delete_identity(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM runs
             WHERE user_id = ?1
                OR repository_id IN (SELECT id FROM repositories WHERE owner_id = ?1)",
            params![id],
        )?;
        tx.execute("DELETE FROM repositories WHERE owner_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Repository operations

    fn upsert_repository(&self, owner_id: &str, input: &RepositoryInput) -> Result<Repository> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let repository = upsert_repository_tx(&tx, owner_id, input, &format_datetime(&Utc::now()))?;
        tx.commit()?;
        Ok(repository)
    }

    fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        self.conn()
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?1"),
                params![id],
                repository_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn delete_repository(&self, id: &str, owner_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM runs WHERE repository_id = ?1
               AND EXISTS (SELECT 1 FROM repositories WHERE id = ?1 AND owner_id = ?2)",
            params![id, owner_id],
        )?;
        let rows = tx.execute(
            "DELETE FROM repositories WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Run operations

    fn create_run(&self, owner_id: &str, run: &NewRun) -> Result<Run> {
        let run_metadata = run
            .run_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("failed to encode run metadata: {e}")))?;
        let created_at = Utc::now();
        let now = format_datetime(&created_at);
        let id = Uuid::new_v4().to_string();

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let repository = upsert_repository_tx(&tx, owner_id, &run.repository, &now)?;

        tx.execute(
            &format!(
                "INSERT INTO runs ({RUN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                id,
                owner_id,
                repository.id,
                run.energy_kwh.raw(),
                run.co2_kg.raw(),
                run.duration_s.raw(),
                run_metadata,
                run.git_commit_sha,
                run.branch_name,
                run.workflow_name,
                now,
            ],
        )?;

        tx.commit()?;

        Ok(Run {
            id,
            user_id: owner_id.to_string(),
            repository_id: repository.id,
            energy_kwh: run.energy_kwh,
            co2_kg: run.co2_kg,
            duration_s: run.duration_s,
            run_metadata: run.run_metadata.clone(),
            git_commit_sha: run.git_commit_sha.clone(),
            branch_name: run.branch_name.clone(),
            workflow_name: run.workflow_name.clone(),
            created_at: parse_datetime(&now),
        })
    }

    fn get_run(&self, id: &str) -> Result<Option<Run>> {
        self.conn()
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![id],
                run_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_identity_runs(&self, owner_id: &str, query: &RunQuery) -> Result<Page<Run>> {
        self.query_runs(Some(owner_id), query.repository_id.as_deref(), query)
    }

    fn list_repository_runs(&self, repository_id: &str, query: &RunQuery) -> Result<Page<Run>> {
        let exists = self
            .conn()
            .query_row(
                "SELECT 1 FROM repositories WHERE id = ?1",
                params![repository_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(Error::NotFound);
        }

        self.query_runs(None, Some(repository_id), query)
    }

    fn delete_run(&self, id: &str, owner_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM runs WHERE id = ?1 AND user_id = ?2",
            params![id, owner_id],
        )?;
        Ok(rows > 0)
    }

    // Aggregation

    fn list_repositories_with_stats(
        &self,
        query: &RepositoryQuery,
    ) -> Result<Page<RepositoryWithStats>> {
        let conn = self.conn();
        let owner = query.owner.as_deref();
        let name = query.name_contains.as_deref().map(escape_like);

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM (
                     SELECT r.id FROM repositories r
                     JOIN users u ON u.id = r.owner_id
                     JOIN runs x ON x.repository_id = r.id
                     WHERE {REPOSITORY_FILTER}
                     GROUP BY r.id
                 )"
            ),
            params![owner, name],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "{STATS_SELECT}
             WHERE {REPOSITORY_FILTER}
             GROUP BY r.id
             HAVING COUNT(x.id) > 0
             ORDER BY {} {}, r.id ASC
             LIMIT ?3 OFFSET ?4",
            query.sort.order_expr(),
            query.order.keyword(),
        ))?;
        let rows = stmt.query_map(
            params![owner, name, query.page.limit, query.page.offset()],
            stats_from_row,
        )?;

        Ok(Page {
            items: rows.collect::<rusqlite::Result<Vec<_>>>()?,
            total,
        })
    }

    fn get_repository_with_stats(&self, id: &str) -> Result<Option<RepositoryWithStats>> {
        self.conn()
            .query_row(
                &format!("{STATS_SELECT} WHERE r.id = ?1 GROUP BY r.id"),
                params![id],
                stats_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_identity_stats(&self, owner_id: &str) -> Result<IdentityStats> {
        self.conn()
            .query_row(
                "SELECT COALESCE(SUM(co2_micros), 0), COALESCE(AVG(co2_micros), 0.0),
                        COALESCE(SUM(energy_micros), 0), COALESCE(AVG(energy_micros), 0.0),
                        COALESCE(SUM(duration_millis), 0), COUNT(*),
                        COUNT(DISTINCT repository_id), MAX(created_at)
                 FROM runs WHERE user_id = ?1",
                params![owner_id],
                |row| {
                    let avg_co2: f64 = row.get(1)?;
                    let avg_energy: f64 = row.get(3)?;
                    Ok(IdentityStats {
                        total_co2_kg: Micros::from_raw(row.get(0)?),
                        avg_co2_kg: avg_co2 / 1_000_000.0,
                        total_energy_kwh: Micros::from_raw(row.get(2)?),
                        avg_energy_kwh: avg_energy / 1_000_000.0,
                        total_duration_s: Millis::from_raw(row.get(4)?),
                        run_count: row.get(5)?,
                        repository_count: row.get(6)?,
                        last_run_at: row
                            .get::<_, Option<String>>(7)?
                            .map(|s| parse_datetime(&s)),
                    })
                },
            )
            .map_err(Error::from)
    }
}
