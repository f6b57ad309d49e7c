//! Backend-neutral parameter and row types.
//!
//! Both backends bind `SqlValue` parameters and hand rows back as `Row`, so
//! the per-table code in this module never touches a driver type directly.

use super::DbError;

/// A single SQL parameter or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Build a `&[SqlValue]` parameter slice, mirroring `rusqlite::params!`.
#[macro_export]
macro_rules! sql_params {
    () => {
        &[] as &[$crate::db::SqlValue]
    };
    ($($value:expr),+ $(,)?) => {
        &[$($crate::db::SqlValue::from($value)),+] as &[$crate::db::SqlValue]
    };
}

/// Conversion out of a column value.
pub trait FromSqlValue: Sized {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self, DbError>;
}

fn type_mismatch(column: &str, expected: &'static str) -> DbError {
    DbError::ColumnType {
        column: column.to_string(),
        expected,
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self, DbError> {
        match value {
            SqlValue::Integer(v) => Ok(*v),
            _ => Err(type_mismatch(column, "integer")),
        }
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self, DbError> {
        match value {
            SqlValue::Integer(v) => i32::try_from(*v).map_err(|_| type_mismatch(column, "i32")),
            _ => Err(type_mismatch(column, "integer")),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self, DbError> {
        match value {
            SqlValue::Real(v) => Ok(*v),
            SqlValue::Integer(v) => Ok(*v as f64),
            _ => Err(type_mismatch(column, "real")),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self, DbError> {
        match value {
            SqlValue::Text(v) => Ok(v.clone()),
            _ => Err(type_mismatch(column, "text")),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self, DbError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql_value(column, value).map(Some)
        }
    }
}

/// One result row, addressed by column name.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Typed read of a named column.
    pub fn get<T: FromSqlValue>(&self, column: &str) -> Result<T, DbError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DbError::MissingColumn(column.to_string()))?;
        T::from_sql_value(column, &self.values[idx])
    }

    /// Read a nullable text column, treating NULL as the empty string.
    ///
    /// Entity attribute columns are stored as trimmed strings but rows
    /// restored from a backup may carry NULLs.
    pub fn text_or_empty(&self, column: &str) -> Result<String, DbError> {
        Ok(self.get::<Option<String>>(column)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(
            vec!["id".into(), "name".into(), "fee".into(), "website".into()],
            vec![
                SqlValue::Integer(7),
                SqlValue::Text("Acme".into()),
                SqlValue::Integer(5000),
                SqlValue::Null,
            ],
        )
    }

    #[test]
    fn test_typed_reads() {
        let row = row();
        assert_eq!(row.get::<i64>("id").unwrap(), 7);
        assert_eq!(row.get::<String>("name").unwrap(), "Acme");
        assert_eq!(row.get::<f64>("fee").unwrap(), 5000.0);
        assert_eq!(row.get::<Option<String>>("website").unwrap(), None);
        assert_eq!(row.text_or_empty("website").unwrap(), "");
    }

    #[test]
    fn test_missing_column_and_type_mismatch() {
        let row = row();
        assert!(matches!(
            row.get::<i64>("nope"),
            Err(DbError::MissingColumn(c)) if c == "nope"
        ));
        assert!(matches!(
            row.get::<i64>("name"),
            Err(DbError::ColumnType { expected: "integer", .. })
        ));
    }

    #[test]
    fn test_params_macro_converts_options() {
        let title: Option<&str> = None;
        let params = sql_params![1_i64, "x", title, Some(2.5)];
        assert_eq!(
            params,
            &[
                SqlValue::Integer(1),
                SqlValue::Text("x".into()),
                SqlValue::Null,
                SqlValue::Real(2.5),
            ]
        );
    }
}
