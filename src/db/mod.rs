//! Request-scoped data access over SQLite or PostgreSQL.
//!
//! A `Database` is only configuration; it hands out `CrmDb` sessions. Each
//! session belongs to one inbound request: the connection is opened on the
//! first statement, a transaction is begun implicitly, and nothing is durable
//! until `commit()`. Dropping the session rolls back whatever was not
//! committed and releases the connection, on success and failure alike.
//!
//! Statements throughout the crate are written once, with `?` placeholders.
//! The backend adapts placeholder syntax and the way generated ids are
//! reported.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};

pub mod types;
pub mod value;

mod sqlite;
#[cfg(feature = "postgres")]
mod pg;

pub use types::*;
pub use value::{FromSqlValue, Row, SqlValue};

use sqlite::SqliteBackend;

/// Which engine a `Database` talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Sqlite { path: PathBuf },
    Postgres { url: String },
}

impl BackendConfig {
    /// How this backend reports the primary key of a freshly inserted row.
    pub fn id_strategy(&self) -> IdStrategy {
        match self {
            BackendConfig::Sqlite { .. } => SqliteBackend::id_strategy(),
            BackendConfig::Postgres { .. } => IdStrategy::Returning,
        }
    }

    pub fn is_postgres(&self) -> bool {
        matches!(self, BackendConfig::Postgres { .. })
    }
}

/// Generated-id convention of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Append `RETURNING id` and read it from the result row.
    Returning,
    /// Run the insert, then ask the connection for its last inserted rowid.
    LastInsertRowid,
}

/// Current UTC time in the format every timestamp column uses.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Rewrite `?` placeholders to PostgreSQL's `$1..$n`, leaving quoted
/// literals untouched.
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
pub(crate) fn translate_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_literal = false;
    let mut n = 0;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                out.push(ch);
            }
            '?' if !in_literal => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Append `RETURNING id` to an insert statement.
pub(crate) fn with_returning_id(sql: &str) -> String {
    let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
    format!("{trimmed} RETURNING id")
}

/// Tables whose `id` column is backed by a generated sequence.
const ID_SEQUENCE_RESETS: &[&str] = &[
    "SELECT setval(pg_get_serial_sequence('companies', 'id'), COALESCE((SELECT MAX(id) FROM companies), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('individuals', 'id'), COALESCE((SELECT MAX(id) FROM individuals), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('relationships', 'id'), COALESCE((SELECT MAX(id) FROM relationships), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('notes', 'id'), COALESCE((SELECT MAX(id) FROM notes), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('follow_ups', 'id'), COALESCE((SELECT MAX(id) FROM follow_ups), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('follow_up_links', 'id'), COALESCE((SELECT MAX(id) FROM follow_up_links), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('follow_up_comments', 'id'), COALESCE((SELECT MAX(id) FROM follow_up_comments), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('proposals', 'id'), COALESCE((SELECT MAX(id) FROM proposals), 0) + 1, false)",
    "SELECT setval(pg_get_serial_sequence('proposal_contacts', 'id'), COALESCE((SELECT MAX(id) FROM proposal_contacts), 0) + 1, false)",
];

enum BackendConn {
    Sqlite(SqliteBackend),
    #[cfg(feature = "postgres")]
    Postgres(pg::PostgresBackend),
}

impl BackendConn {
    fn connect(config: &BackendConfig) -> Result<Self, DbError> {
        match config {
            BackendConfig::Sqlite { path } => Ok(BackendConn::Sqlite(SqliteBackend::open(path)?)),
            #[cfg(feature = "postgres")]
            BackendConfig::Postgres { url } => Ok(BackendConn::Postgres(
                pg::PostgresBackend::connect(url)?,
            )),
            #[cfg(not(feature = "postgres"))]
            BackendConfig::Postgres { .. } => Err(DbError::BackendUnavailable(
                "postgres (rebuild with --features postgres)".to_string(),
            )),
        }
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        match self {
            BackendConn::Sqlite(c) => c.query(sql, params),
            #[cfg(feature = "postgres")]
            BackendConn::Postgres(c) => c.query(sql, params),
        }
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError> {
        match self {
            BackendConn::Sqlite(c) => c.execute(sql, params),
            #[cfg(feature = "postgres")]
            BackendConn::Postgres(c) => c.execute(sql, params),
        }
    }

    fn insert(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        strategy: IdStrategy,
    ) -> Result<i64, DbError> {
        match self {
            BackendConn::Sqlite(c) => c.insert(sql, params, strategy),
            #[cfg(feature = "postgres")]
            BackendConn::Postgres(c) => c.insert(sql, params),
        }
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        match self {
            BackendConn::Sqlite(c) => c.execute_batch(sql),
            #[cfg(feature = "postgres")]
            BackendConn::Postgres(c) => c.execute_batch(sql),
        }
    }
}

/// Handle to a configured database. Cheap to clone; holds no connection.
#[derive(Debug, Clone)]
pub struct Database {
    backend: BackendConfig,
}

impl Database {
    /// Resolve the backend and bring its schema up to date.
    pub fn open(backend: BackendConfig) -> Result<Self, DbError> {
        let db = Self { backend };
        let mut session = db.session();
        let applied = crate::migrations::run_migrations(&mut session)?;
        session.commit()?;
        if applied > 0 {
            log::info!("Database ready ({} migration(s) applied)", applied);
        }
        Ok(db)
    }

    /// Handle without running migrations.
    #[cfg(test)]
    pub(crate) fn open_unmigrated(backend: BackendConfig) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Start a request session. No connection is made until first use.
    pub fn session(&self) -> CrmDb {
        CrmDb {
            backend: self.backend.clone(),
            id_strategy: self.backend.id_strategy(),
            conn: None,
            tx: TxState::Idle,
            sequences_stale: false,
        }
    }

    /// Run one request against a fresh session.
    /// Commits on Ok; rolls back on Err.
    pub fn with_request<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut CrmDb) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut session = self.session();
        let value = match f(&mut session) {
            Ok(value) => value,
            Err(e) => {
                if let Err(rollback_err) = session.rollback() {
                    log::warn!("Failed to roll back failed request: {rollback_err}");
                }
                return Err(e);
            }
        };
        session.commit()?;
        Ok(value)
    }
}

/// Transaction state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    /// Deferred transaction; no write lock held yet.
    Reading,
    Writing,
}

/// One request's view of the database.
///
/// Reads open a deferred transaction. The first write takes the write lock
/// (`BEGIN IMMEDIATE` on SQLite), so a busy database makes the writer wait on
/// `busy_timeout` instead of failing on a stale snapshot. Reads made before
/// that first write are not isolated from it.
pub struct CrmDb {
    backend: BackendConfig,
    id_strategy: IdStrategy,
    conn: Option<BackendConn>,
    tx: TxState,
    /// Rows were inserted with explicit ids since the last sequence reset.
    sequences_stale: bool,
}

impl CrmDb {
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Whether this session has opened its connection yet.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connect on first use and make sure a transaction fit for `write` is open.
    fn conn(&mut self, write: bool) -> Result<&mut BackendConn, DbError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                log::debug!("Opening request connection");
                BackendConn::connect(&self.backend)?
            }
        };
        let postgres = self.backend.is_postgres();
        let conn = self.conn.insert(conn);
        match (self.tx, write) {
            (TxState::Idle, false) => {
                conn.execute_batch("BEGIN")?;
                self.tx = TxState::Reading;
            }
            (TxState::Idle, true) => {
                conn.execute_batch(if postgres { "BEGIN" } else { "BEGIN IMMEDIATE" })?;
                self.tx = TxState::Writing;
            }
            (TxState::Reading, true) if postgres => self.tx = TxState::Writing,
            (TxState::Reading, true) => {
                // Nothing written yet, so ending the read snapshot loses no work.
                conn.execute_batch("COMMIT")?;
                self.tx = TxState::Idle;
                conn.execute_batch("BEGIN IMMEDIATE")?;
                self.tx = TxState::Writing;
            }
            _ => {}
        }
        Ok(conn)
    }

    /// Run a SELECT and collect every row.
    pub fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.conn(false)?.query(sql, params)
    }

    /// Run a SELECT and return the first row, if any.
    pub fn query_one(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, DbError> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Run an INSERT/UPDATE/DELETE and return the number of affected rows.
    pub fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError> {
        self.conn(true)?.execute(sql, params)
    }

    /// Run an INSERT (written without a RETURNING clause) and return the
    /// generated primary key, whatever the backend's convention.
    pub fn insert(&mut self, sql: &str, params: &[SqlValue]) -> Result<i64, DbError> {
        if self.sequences_stale {
            self.reset_id_sequences()?;
        }
        let strategy = self.id_strategy;
        self.conn(true)?.insert(sql, params, strategy)
    }

    /// Run an INSERT that supplies its own `id` and return that id.
    ///
    /// Generated-id sequences are re-aligned before the next generated insert
    /// or commit, whichever comes first.
    pub fn insert_with_id(
        &mut self,
        id: i64,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<i64, DbError> {
        self.execute(sql, params)?;
        self.sequences_stale = true;
        Ok(id)
    }

    /// Run several `;`-separated statements without parameters.
    pub fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn(true)?.execute_batch(sql)
    }

    /// Make everything done so far in this session durable.
    pub fn commit(&mut self) -> Result<(), DbError> {
        if self.tx == TxState::Idle {
            return Ok(());
        }
        if self.sequences_stale {
            self.reset_id_sequences()?;
        }
        if let Some(conn) = self.conn.as_mut() {
            conn.execute_batch("COMMIT")?;
            log::debug!("Committed request transaction");
        }
        self.tx = TxState::Idle;
        Ok(())
    }

    /// Discard everything since the last commit.
    pub fn rollback(&mut self) -> Result<(), DbError> {
        if self.tx == TxState::Idle {
            return Ok(());
        }
        if let Some(conn) = self.conn.as_mut() {
            conn.execute_batch("ROLLBACK")?;
            log::debug!("Rolled back request transaction");
        }
        self.tx = TxState::Idle;
        self.sequences_stale = false;
        Ok(())
    }

    /// Re-align generated-id sequences after rows were inserted with
    /// explicit ids. SQLite derives the next rowid from the table itself.
    pub fn reset_id_sequences(&mut self) -> Result<(), DbError> {
        self.sequences_stale = false;
        if !self.backend.is_postgres() {
            return Ok(());
        }
        for stmt in ID_SEQUENCE_RESETS {
            self.query(stmt, &[])?;
        }
        log::debug!("Re-aligned id sequences");
        Ok(())
    }

    /// Case-insensitive substring match on one column, bound to a pattern
    /// from `like_pattern`. SQLite's LIKE folds ASCII case only; PostgreSQL
    /// uses ILIKE.
    pub(crate) fn contains_op(&self) -> &'static str {
        if self.backend.is_postgres() {
            " ILIKE ? ESCAPE '\\'"
        } else {
            " LIKE ? ESCAPE '\\'"
        }
    }

    /// Collation for text sorts. PostgreSQL's `"C"` orders by code point, as
    /// SQLite's default BINARY collation does.
    pub(crate) fn text_collation(&self) -> &'static str {
        if self.backend.is_postgres() {
            " COLLATE \"C\""
        } else {
            ""
        }
    }
}

impl Drop for CrmDb {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if self.tx != TxState::Idle {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    log::warn!("Failed to roll back uncommitted request work: {e}");
                }
            }
            log::debug!("Released request connection");
        }
    }
}

pub mod companies;
pub mod individuals;
pub mod notes;
pub mod relationships;
pub mod follow_ups;
pub mod proposals;

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::{BackendConfig, Database};

    /// Create a migrated SQLite database in a temporary directory.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of the
    /// test; every session opened from the handle reconnects to the same file.
    pub fn test_database() -> Database {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        Database::open(BackendConfig::Sqlite { path }).expect("Failed to open test database")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_utils::test_database;
    use super::*;
    use crate::sql_params;

    fn count_companies(db: &mut CrmDb) -> i64 {
        db.query_one("SELECT COUNT(*) AS n FROM companies", &[])
            .expect("count")
            .expect("row")
            .get("n")
            .expect("n")
    }

    #[test]
    fn test_translate_placeholders() {
        assert_eq!(
            translate_placeholders("SELECT * FROM t WHERE a = ? AND b = ?"),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
        assert_eq!(
            translate_placeholders("SELECT '?' AS q, x FROM t WHERE y = ?"),
            "SELECT '?' AS q, x FROM t WHERE y = $1"
        );
        assert_eq!(translate_placeholders("DELETE FROM t"), "DELETE FROM t");
    }

    #[test]
    fn test_with_returning_id() {
        assert_eq!(
            with_returning_id("INSERT INTO t (a) VALUES (?);  "),
            "INSERT INTO t (a) VALUES (?) RETURNING id"
        );
    }

    #[test]
    fn test_id_strategy_per_backend() {
        let pg = BackendConfig::Postgres {
            url: "postgres://localhost/crm".into(),
        };
        assert_eq!(pg.id_strategy(), IdStrategy::Returning);
        // Bundled SQLite is well past 3.35.
        let lite = BackendConfig::Sqlite {
            path: PathBuf::from("crm.db"),
        };
        assert_eq!(lite.id_strategy(), IdStrategy::Returning);
    }

    #[test]
    fn test_session_connects_lazily() {
        let database = test_database();
        let mut db = database.session();
        assert!(!db.is_connected());
        count_companies(&mut db);
        assert!(db.is_connected());
    }

    #[test]
    fn test_insert_reports_generated_id_both_ways() {
        let database = test_database();
        let mut db = database.session();
        let sql = "INSERT INTO companies (name, website, type, linkedin_url, location, created_at)
                   VALUES (?, '', '', '', '', ?)";

        let first = db.insert(sql, sql_params!["Acme", now_timestamp()]).expect("insert");

        db.id_strategy = IdStrategy::LastInsertRowid;
        let second = db.insert(sql, sql_params!["Globex", now_timestamp()]).expect("insert");

        assert!(first > 0);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_uncommitted_work_is_discarded_on_drop() {
        let database = test_database();
        {
            let mut db = database.session();
            db.insert(
                "INSERT INTO companies (name, created_at) VALUES (?, ?)",
                sql_params!["Ghost", now_timestamp()],
            )
            .expect("insert");
            // Visible inside the same session before commit.
            assert_eq!(count_companies(&mut db), 1);
        }
        let mut db = database.session();
        assert_eq!(count_companies(&mut db), 0);
    }

    #[test]
    fn test_commit_makes_work_durable() {
        let database = test_database();
        {
            let mut db = database.session();
            db.insert(
                "INSERT INTO companies (name, created_at) VALUES (?, ?)",
                sql_params!["Acme", now_timestamp()],
            )
            .expect("insert");
            db.commit().expect("commit");
        }
        let mut db = database.session();
        assert_eq!(count_companies(&mut db), 1);
    }

    #[test]
    fn test_with_request_discards_on_error() {
        let database = test_database();
        let result: Result<(), DbError> = database.with_request(|db| {
            db.insert(
                "INSERT INTO companies (name, created_at) VALUES (?, ?)",
                sql_params!["Acme", now_timestamp()],
            )?;
            Err(DbError::NoGeneratedId)
        });
        assert!(result.is_err());

        let mut db = database.session();
        assert_eq!(count_companies(&mut db), 0);
    }

    #[test]
    fn test_postgres_without_feature_is_reported() {
        if cfg!(feature = "postgres") {
            return;
        }
        let database = Database {
            backend: BackendConfig::Postgres {
                url: "postgres://localhost/crm".into(),
            },
        };
        let mut db = database.session();
        assert!(matches!(
            db.query("SELECT 1", &[]),
            Err(DbError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_rollback_discards_and_session_stays_usable() {
        let database = test_database();
        let mut db = database.session();
        db.insert(
            "INSERT INTO companies (name, created_at) VALUES (?, ?)",
            sql_params!["Ghost", now_timestamp()],
        )
        .expect("insert");
        db.rollback().expect("rollback");
        assert_eq!(count_companies(&mut db), 0);

        db.insert(
            "INSERT INTO companies (name, created_at) VALUES (?, ?)",
            sql_params!["Acme", now_timestamp()],
        )
        .expect("insert");
        db.commit().expect("commit");
        assert_eq!(count_companies(&mut database.session()), 1);
    }

    #[test]
    fn test_explicit_ids_mark_sequences_for_reset() {
        let database = test_database();
        let mut db = database.session();
        let fields = crate::entity::CompanyFields {
            name: "Restored".into(),
            ..Default::default()
        };
        assert_eq!(db.insert_company(Some(10), &fields).expect("insert"), 10);
        assert!(db.sequences_stale);

        // The next generated insert re-aligns first (a no-op on SQLite).
        assert_eq!(db.insert_company(None, &fields).expect("insert"), 11);
        assert!(!db.sequences_stale);

        db.insert_company(Some(20), &fields).expect("insert");
        db.commit().expect("commit");
        assert!(!db.sequences_stale);
        let mut db = database.session();
        assert_eq!(db.insert_company(None, &fields).expect("insert"), 21);
    }

    #[test]
    fn test_write_after_read_survives_concurrent_commit() {
        let database = test_database();
        let mut reader = database.session();
        assert_eq!(count_companies(&mut reader), 0);

        let mut writer = database.session();
        writer
            .insert(
                "INSERT INTO companies (name, created_at) VALUES (?, ?)",
                sql_params!["First", now_timestamp()],
            )
            .expect("insert");
        writer.commit().expect("commit");

        // The reader's snapshot predates that commit; its first write takes
        // the write lock on current data.
        reader
            .insert(
                "INSERT INTO companies (name, created_at) VALUES (?, ?)",
                sql_params!["Second", now_timestamp()],
            )
            .expect("insert after concurrent commit");
        assert_eq!(count_companies(&mut reader), 2);
        reader.commit().expect("commit");
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_postgres_generated_ids_follow_explicit_ids() {
        let Ok(url) = std::env::var("MINICRM_TEST_DATABASE_URL") else {
            return;
        };
        let database = Database::open(BackendConfig::Postgres { url }).expect("open");
        let mut db = database.session();
        let max: i64 = db
            .query_one("SELECT COALESCE(MAX(id), 0) AS n FROM companies", &[])
            .expect("max")
            .expect("row")
            .get("n")
            .expect("n");
        let fields = crate::entity::CompanyFields {
            name: "Restored".into(),
            ..Default::default()
        };
        let explicit = db.insert_company(Some(max + 1000), &fields).expect("insert");
        let generated = db.insert_company(None, &fields).expect("insert");
        assert_eq!(generated, explicit + 1);
        // Dropped without commit: rows are rolled back.
    }
}

