//! [`Executor`] for a live MySQL session.
//!
//! Every statement is prepared, DDL included. MySQL accepts `CREATE TABLE`
//! and `ALTER TABLE` over the prepared protocol.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::{DbError, SyncError};

use super::{Executor, Row, Value};

/// MySQL error numbers that mean the account lacks a privilege.
///
/// 1044 database access denied, 1045 access denied, 1142 table command
/// denied, 1143 column command denied, 1227 specific privilege required,
/// 1370 routine command denied.
pub const PRIVILEGE_ERROR_CODES: &[u16] = &[1044, 1045, 1142, 1143, 1227, 1370];

/// Opens a single connection to `url`.
pub async fn connect(url: &str) -> Result<MySqlConnection, SyncError> {
    MySqlConnection::connect(url)
        .await
        .map_err(|e| SyncError::Connectivity {
            message: e.to_string(),
        })
}

/// Maps a driver error onto the engine's failure kinds.
#[must_use]
pub fn classify(err: &sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbError::connectivity(err.to_string()),
        sqlx::Error::Database(db) => {
            let code = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            match code {
                Some(code) if PRIVILEGE_ERROR_CODES.contains(&code) => {
                    DbError::privilege(db.message())
                }
                _ => DbError::other(db.message()),
            }
        }
        other => DbError::other(other.to_string()),
    }
}

fn bind<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Text(s) => query.bind(s.as_str()),
            Value::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> Result<Row, DbError> {
    let mut values = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index).map_err(|e| classify(&e))?;
        if raw.is_null() {
            values.push(Value::Null);
            continue;
        }

        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = if type_name == "DATETIME" || type_name == "TIMESTAMP" {
            Value::DateTime(
                row.try_get::<NaiveDateTime, _>(index)
                    .map_err(|e| classify(&e))?,
            )
        } else if let Ok(text) = row.try_get::<String, _>(index) {
            Value::Text(text)
        } else if let Ok(number) = row.try_get::<i64, _>(index) {
            Value::Text(number.to_string())
        } else {
            let bytes: Vec<u8> = row.try_get(index).map_err(|e| classify(&e))?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        };
        values.push(value);
    }
    Ok(Row(values))
}

#[async_trait]
impl Executor for MySqlConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        debug!(sql = %sql, params = params.len(), "Executing SQL");
        let result = bind(sqlx::query(sql), params)
            .execute(&mut *self)
            .await
            .map_err(|e| classify(&e))?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        debug!(sql = %sql, params = params.len(), "Running query");
        let rows = bind(sqlx::query(sql), params)
            .fetch_all(&mut *self)
            .await
            .map_err(|e| classify(&e))?;
        rows.iter().map(decode_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbErrorKind;

    #[test]
    fn test_io_errors_are_connectivity() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(classify(&err).kind, DbErrorKind::Connectivity);
        assert_eq!(classify(&sqlx::Error::PoolTimedOut).kind, DbErrorKind::Connectivity);
    }

    fn assert_executor<E: Executor>() {}

    #[test]
    fn test_connection_is_an_executor() {
        assert_executor::<MySqlConnection>();
        assert_executor::<Box<MySqlConnection>>();
    }

    #[test]
    fn test_other_errors() {
        assert_eq!(classify(&sqlx::Error::RowNotFound).kind, DbErrorKind::Other);
    }
}
