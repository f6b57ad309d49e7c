//! Schema migration framework.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`,
//! one script per backend. Each migration runs exactly once, tracked by the
//! `schema_version` table.
//!
//! SQLite databases created before the framework existed had their columns
//! added ad hoc at startup. The bootstrap step detects such a database,
//! replays those column additions (tolerating the ones already present), and
//! marks the baseline as applied.

use std::path::Path;

use crate::db::{now_timestamp, BackendConfig, CrmDb, DbError};
use crate::sql_params;

struct Migration {
    version: i64,
    sqlite: &'static str,
    postgres: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sqlite: include_str!("migrations/sqlite/001_baseline.sql"),
    postgres: include_str!("migrations/postgres/001_baseline.sql"),
}];

/// Column additions older SQLite databases may be missing.
const LEGACY_SQLITE_COLUMNS: &[&str] = &[
    "ALTER TABLE companies ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE individuals ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE follow_ups ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE follow_ups ADD COLUMN opp_type TEXT NOT NULL DEFAULT 'TBD'",
    "ALTER TABLE follow_ups ADD COLUMN priority_level INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE follow_ups ADD COLUMN priority_order INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE follow_ups ADD COLUMN closed_at TEXT",
    "ALTER TABLE proposals ADD COLUMN onboarding_fee REAL",
    "ALTER TABLE proposals ADD COLUMN monthly_retainer REAL",
    "ALTER TABLE proposals ADD COLUMN onboarding_fee_max REAL",
    "ALTER TABLE proposals ADD COLUMN monthly_retainer_max REAL",
];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(db: &mut CrmDb) -> Result<(), DbError> {
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| DbError::Migration(format!("Failed to create schema_version table: {e}")))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(db: &mut CrmDb) -> Result<i64, DbError> {
    let row = db
        .query_one(
            "SELECT COALESCE(MAX(version), 0) AS version FROM schema_version",
            &[],
        )
        .map_err(|e| DbError::Migration(format!("Failed to read schema version: {e}")))?;
    match row {
        Some(row) => row.get("version"),
        None => Ok(0),
    }
}

fn record_version(db: &mut CrmDb, version: i64) -> Result<(), DbError> {
    db.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
        sql_params![version, now_timestamp()],
    )
    .map_err(|e| DbError::Migration(format!("Failed to record migration v{version}: {e}")))?;
    Ok(())
}

/// Detect a pre-framework SQLite database and mark the baseline as applied.
///
/// Such a database has a `companies` table but no recorded version. Its
/// missing columns are added first so every query in the crate can run
/// against it.
fn bootstrap_existing_db(db: &mut CrmDb) -> Result<bool, DbError> {
    if db.backend().is_postgres() || current_version(db)? > 0 {
        return Ok(false);
    }

    let has_companies = db
        .query_one(
            "SELECT 1 AS present FROM sqlite_master WHERE type = 'table' AND name = 'companies'",
            &[],
        )?
        .is_some();
    if !has_companies {
        return Ok(false);
    }

    if let BackendConfig::Sqlite { path } = db.backend().clone() {
        backup_before_migration(&path)?;
    }

    for stmt in LEGACY_SQLITE_COLUMNS {
        // "duplicate column name" just means this one was already added.
        if let Err(e) = db.execute(stmt, &[]) {
            log::debug!("Skipping legacy column migration: {e}");
        }
    }
    // The baseline is all IF NOT EXISTS: it only fills in missing tables
    // and indexes here.
    if let Some(baseline) = MIGRATIONS.first() {
        db.execute_batch(baseline.sqlite)?;
    }
    record_version(db, 1)?;
    log::info!("Migration bootstrap: marked v1 (baseline) as applied for existing database");
    Ok(true)
}

/// Back up a SQLite database file before it is migrated in place.
///
/// Uses SQLite's online backup API to create a hot copy at
/// `<db_path>.pre-migration.bak`.
fn backup_before_migration(path: &Path) -> Result<(), DbError> {
    if !path.exists() {
        return Ok(());
    }

    let backup_path = format!("{}.pre-migration.bak", path.display());
    let src = rusqlite::Connection::open(path)
        .map_err(|e| DbError::Migration(format!("Failed to open database for backup: {e}")))?;
    let mut dst = rusqlite::Connection::open(&backup_path)
        .map_err(|e| DbError::Migration(format!("Failed to open backup file: {e}")))?;

    let backup = rusqlite::backup::Backup::new(&src, &mut dst)
        .map_err(|e| DbError::Migration(format!("Failed to initialize pre-migration backup: {e}")))?;
    backup
        .step(-1)
        .map_err(|e| DbError::Migration(format!("Pre-migration backup failed: {e}")))?;

    log::info!("Pre-migration backup created at {}", backup_path);
    Ok(())
}

/// Run all pending migrations inside the session's transaction.
///
/// Returns the number of migrations applied (0 if already up-to-date). The
/// caller commits.
///
/// Forward-compat guard: if the database has a higher version than the
/// highest known migration, returns an error telling the user to upgrade.
pub fn run_migrations(db: &mut CrmDb) -> Result<usize, DbError> {
    ensure_schema_version_table(db)?;
    bootstrap_existing_db(db)?;

    let current = current_version(db)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(DbError::Migration(format!(
            "Database schema version ({current}) is newer than this build supports ({max_known}). \
             Please upgrade."
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    for migration in &pending {
        let sql = if db.backend().is_postgres() {
            migration.postgres
        } else {
            migration.sqlite
        };
        db.execute_batch(sql).map_err(|e| {
            DbError::Migration(format!("Migration v{} failed: {e}", migration.version))
        })?;
        record_version(db, migration.version)?;
        log::info!("Applied migration v{}", migration.version);
    }

    Ok(pending.len())
}
