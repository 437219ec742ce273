#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tablesync::audit::AUDIT_TABLE;
use tablesync::error::DbError;
use tablesync::executor::{Executor, Row, Value};
use tablesync::introspect::COLUMNS_QUERY;

/// An in-memory stand-in for a MySQL database.
///
/// Understands exactly the statements the engine issues: the catalog query,
/// `CREATE TABLE IF NOT EXISTS`, `ALTER TABLE ... ADD/MODIFY COLUMN`, and
/// audit inserts and selects.
#[derive(Default)]
pub struct MemoryDatabase {
    pub tables: BTreeMap<String, Vec<(String, String)>>,
    pub audit_rows: Vec<Vec<Value>>,
    pub statements: Vec<String>,
    /// Rewrites a stored type the way the catalog reports it.
    pub report_type: Option<fn(&str) -> String>,
    /// Tables on which DDL is refused.
    pub ddl_denied: HashSet<String>,
    pub fail_audit_writes: bool,
    pub offline: bool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        self.tables.insert(
            name.to_string(),
            columns
                .iter()
                .map(|(n, t)| ((*n).to_string(), (*t).to_string()))
                .collect(),
        );
        self
    }

    pub fn column_type(&self, table: &str, column: &str) -> Option<&str> {
        self.tables.get(table).and_then(|cols| {
            cols.iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(column))
                .map(|(_, t)| t.as_str())
        })
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Statements other than audit inserts.
    pub fn ddl(&self) -> Vec<&str> {
        self.statements
            .iter()
            .map(String::as_str)
            .filter(|s| s.starts_with("CREATE") || s.starts_with("ALTER"))
            .filter(|s| !s.contains(AUDIT_TABLE))
            .collect()
    }

    fn denied(&self, table: &str) -> Result<(), DbError> {
        if self.ddl_denied.contains(table) {
            return Err(DbError::privilege(format!(
                "ALTER command denied to user 'app'@'localhost' for table '{table}'"
            )));
        }
        Ok(())
    }

    fn create_table(&mut self, sql: &str) -> Result<(), DbError> {
        let rest = &sql["CREATE TABLE IF NOT EXISTS ".len()..];
        let open = rest.find('(').ok_or_else(|| DbError::other("missing column list"))?;
        let name = rest[..open].trim().to_string();
        self.denied(&name)?;
        if self.tables.contains_key(&name) {
            return Ok(());
        }

        let body = &rest[open + 1..rest.len() - 1];
        let columns = split_top_level(body)
            .into_iter()
            .map(|clause| {
                let mut parts = clause.split_whitespace();
                let column = parts.next().unwrap_or_default().to_string();
                let sql_type = parts.next().unwrap_or_default().to_string();
                (column, sql_type)
            })
            .collect();
        self.tables.insert(name, columns);
        Ok(())
    }

    fn alter_table(&mut self, sql: &str) -> Result<(), DbError> {
        let parts: Vec<&str> = sql.split_whitespace().collect();
        let (table, action, column) = (parts[2], parts[3], parts[5]);
        let sql_type = parts[6..].join(" ");
        self.denied(table)?;

        let columns = self
            .tables
            .get_mut(table)
            .ok_or_else(|| DbError::other(format!("Table '{table}' doesn't exist")))?;
        match action {
            "ADD" => {
                if columns.iter().any(|(n, _)| n.eq_ignore_ascii_case(column)) {
                    return Err(DbError::other(format!("Duplicate column name '{column}'")));
                }
                columns.push((column.to_string(), sql_type));
            }
            "MODIFY" => {
                let entry = columns
                    .iter_mut()
                    .find(|(n, _)| n.eq_ignore_ascii_case(column))
                    .ok_or_else(|| DbError::other(format!("Unknown column '{column}'")))?;
                entry.1 = sql_type;
            }
            other => return Err(DbError::other(format!("unsupported ALTER {other}"))),
        }
        Ok(())
    }

    fn insert_audit(&mut self, params: &[Value]) -> Result<(), DbError> {
        if !self.tables.contains_key(AUDIT_TABLE) {
            return Err(DbError::other(format!(
                "Table 'app.{AUDIT_TABLE}' doesn't exist"
            )));
        }
        if self.fail_audit_writes {
            return Err(DbError::other("The table is full"));
        }
        self.audit_rows.push(params.to_vec());
        Ok(())
    }

    fn select_audit(&self, sql: &str, params: &[Value]) -> Vec<Row> {
        let limit: usize = sql
            .rsplit("LIMIT ")
            .next()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(usize::MAX);
        let table = if sql.contains("WHERE table_name = ?") {
            params.first().and_then(Value::as_str)
        } else {
            None
        };

        self.audit_rows
            .iter()
            .rev()
            .filter(|row| table.map_or(true, |t| row[1].as_str() == Some(t)))
            .take(limit)
            .map(|row| Row(row.clone()))
            .collect()
    }
}

/// Splits on commas that are not inside parentheses.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts
}

#[async_trait]
impl Executor for MemoryDatabase {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        if self.offline {
            return Err(DbError::connectivity("Connection refused"));
        }
        self.statements.push(sql.to_string());

        if sql.starts_with("CREATE TABLE IF NOT EXISTS ") {
            self.create_table(sql)?;
        } else if sql.starts_with("ALTER TABLE ") {
            self.alter_table(sql)?;
        } else if sql.starts_with(&format!("INSERT INTO {AUDIT_TABLE}")) {
            self.insert_audit(params)?;
        } else {
            return Err(DbError::other(format!("unsupported statement: {sql}")));
        }
        Ok(1)
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        if self.offline {
            return Err(DbError::connectivity("Connection refused"));
        }

        if sql == COLUMNS_QUERY {
            let table = params.first().and_then(Value::as_str).unwrap_or_default();
            let report = self.report_type;
            return Ok(self
                .tables
                .get(table)
                .map(|cols| {
                    cols.iter()
                        .map(|(name, ty)| {
                            let shown = report.map_or_else(|| ty.clone(), |f| f(ty));
                            Row(vec![Value::from(name.as_str()), Value::from(shown)])
                        })
                        .collect()
                })
                .unwrap_or_default());
        }

        if sql.contains(&format!("FROM {AUDIT_TABLE}")) {
            return Ok(self.select_audit(sql, params));
        }

        Err(DbError::other(format!("unsupported query: {sql}")))
    }
}
