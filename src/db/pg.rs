//! PostgreSQL backend (blocking `postgres` client).
//!
//! Statements arrive written with `?` placeholders and are rewritten to
//! `$n` before being sent. Generated ids always come back through
//! `RETURNING id`.

use std::error::Error;

use bytes::BytesMut;
use postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use postgres::{Client, NoTls};

use super::{DbError, Row, SqlValue};

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Integer(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if *ty == Type::BOOL {
                    (*v != 0).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Real(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(v) => v.as_str().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

pub struct PostgresBackend {
    client: Client,
}

impl PostgresBackend {
    pub fn connect(url: &str) -> Result<Self, DbError> {
        let client = Client::connect(url, NoTls)?;
        Ok(Self { client })
    }

    fn bind(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
        params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }

    fn convert_row(row: &postgres::Row) -> Result<Row, DbError> {
        let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in row.columns().iter().enumerate() {
            let ty = column.type_();
            let value = if *ty == Type::INT2 {
                row.try_get::<_, Option<i16>>(idx)?
                    .map_or(SqlValue::Null, |v| SqlValue::Integer(v as i64))
            } else if *ty == Type::INT4 {
                row.try_get::<_, Option<i32>>(idx)?
                    .map_or(SqlValue::Null, |v| SqlValue::Integer(v as i64))
            } else if *ty == Type::INT8 {
                row.try_get::<_, Option<i64>>(idx)?
                    .map_or(SqlValue::Null, SqlValue::Integer)
            } else if *ty == Type::FLOAT4 {
                row.try_get::<_, Option<f32>>(idx)?
                    .map_or(SqlValue::Null, |v| SqlValue::Real(v as f64))
            } else if *ty == Type::FLOAT8 {
                row.try_get::<_, Option<f64>>(idx)?
                    .map_or(SqlValue::Null, SqlValue::Real)
            } else if *ty == Type::BOOL {
                row.try_get::<_, Option<bool>>(idx)?
                    .map_or(SqlValue::Null, |v| SqlValue::Integer(v as i64))
            } else if *ty == Type::TEXT
                || *ty == Type::VARCHAR
                || *ty == Type::BPCHAR
                || *ty == Type::NAME
            {
                row.try_get::<_, Option<String>>(idx)?
                    .map_or(SqlValue::Null, SqlValue::Text)
            } else {
                return Err(DbError::UnsupportedType(format!(
                    "{} in column {}",
                    ty.name(),
                    column.name()
                )));
            };
            values.push(value);
        }
        Ok(Row::new(columns, values))
    }

    pub fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let sql = super::translate_placeholders(sql);
        let rows = self.client.query(sql.as_str(), &Self::bind(params))?;
        rows.iter().map(Self::convert_row).collect()
    }

    pub fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError> {
        let sql = super::translate_placeholders(sql);
        let affected = self.client.execute(sql.as_str(), &Self::bind(params))?;
        Ok(affected as usize)
    }

    pub fn insert(&mut self, sql: &str, params: &[SqlValue]) -> Result<i64, DbError> {
        let sql = super::translate_placeholders(&super::with_returning_id(sql));
        let row = self
            .client
            .query_opt(sql.as_str(), &Self::bind(params))?
            .ok_or(DbError::NoGeneratedId)?;
        Ok(row.try_get::<_, i64>(0)?)
    }

    pub fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        Ok(self.client.batch_execute(sql)?)
    }
}
