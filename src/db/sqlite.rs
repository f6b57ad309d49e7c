//! SQLite backend (rusqlite).

use std::path::Path;
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};

use super::{DbError, IdStrategy, Row, SqlValue};

/// First SQLite release that understands `INSERT ... RETURNING`.
const RETURNING_MIN_VERSION: i32 = 3_035_000;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) the database file.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL keeps readers in other requests unblocked while one writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Ok(Self { conn })
    }

    /// Whether the linked SQLite library can hand back ids via `RETURNING`.
    pub fn id_strategy() -> IdStrategy {
        if rusqlite::version_number() >= RETURNING_MIN_VERSION {
            IdStrategy::Returning
        } else {
            IdStrategy::LastInsertRowid
        }
    }

    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(match row.get_ref(idx)? {
                    ValueRef::Null => SqlValue::Null,
                    ValueRef::Integer(v) => SqlValue::Integer(v),
                    ValueRef::Real(v) => SqlValue::Real(v),
                    ValueRef::Text(bytes) => {
                        SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                    ValueRef::Blob(_) => {
                        return Err(DbError::UnsupportedType(format!(
                            "blob in column {}",
                            columns[idx]
                        )))
                    }
                });
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    pub fn insert(
        &self,
        sql: &str,
        params: &[SqlValue],
        strategy: IdStrategy,
    ) -> Result<i64, DbError> {
        match strategy {
            IdStrategy::Returning => {
                let sql = super::with_returning_id(sql);
                Ok(self
                    .conn
                    .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?)
            }
            IdStrategy::LastInsertRowid => {
                self.conn.execute(sql, params_from_iter(params.iter()))?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        Ok(self.conn.execute_batch(sql)?)
    }
}
