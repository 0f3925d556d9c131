//! 읽기 전용 SQLite 데이터베이스
//!
//! 허용 목록에 있는 테이블의 스키마만 노출하고,
//! 쿼리는 `spawn_blocking`에서 실행합니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};

use crate::error::{DocQaError, Result};

/// 스키마 설명에 포함할 테이블당 샘플 행 수
const SAMPLE_ROWS: usize = 3;
/// 결과 렌더링 최대 행 수
pub const MAX_RESULT_ROWS: usize = 100;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// QueryResult
// ============================================================================

/// 쿼리 실행 결과
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// MAX_RESULT_ROWS에서 잘렸는지
    pub truncated: bool,
}

impl QueryResult {
    /// 행마다 `{column: value}` 객체인 JSON 배열로 렌더링
    pub fn render(&self) -> String {
        let objects: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (column, value) in self.columns.iter().zip(row) {
                    object.insert(column.clone(), value.clone());
                }
                Value::Object(object)
            })
            .collect();

        let mut out = Value::Array(objects).to_string();
        if self.truncated {
            out.push_str(&format!(" (truncated to {} rows)", MAX_RESULT_ROWS));
        }
        out
    }
}

// ============================================================================
// SqliteDatabase
// ============================================================================

/// 읽기 전용 SQLite 핸들
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    tables: Vec<String>,
}

impl SqliteDatabase {
    /// DB 열기 (`SQLITE_OPEN_READ_ONLY`)
    ///
    /// 허용 목록의 테이블이 DB에 없으면 설정 에러입니다.
    pub fn open(path: &Path, tables: &[String]) -> Result<Self> {
        if !path.exists() {
            return Err(DocQaError::config(format!("database not found: {:?}", path)));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DocQaError::config(format!("failed to open database {:?}: {}", path, e)))?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| DocQaError::config(format!("failed to set busy timeout: {}", e)))?;

        let existing = list_tables(&conn)?;
        let missing: Vec<&str> = tables
            .iter()
            .filter(|t| !existing.iter().any(|e| e.eq_ignore_ascii_case(t)))
            .map(|t| t.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(DocQaError::config(format!(
                "allow-listed tables not found in {:?}: {}",
                path,
                missing.join(", ")
            )));
        }

        tracing::info!("Opened {:?} read-only ({} tables allowed)", path, tables.len());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
            tables: tables.to_vec(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 허용된 테이블 목록
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// 허용 테이블의 CREATE 문과 샘플 행
    pub fn schema_description(&self) -> Result<String> {
        let conn = self.lock()?;
        let mut sections = Vec::with_capacity(self.tables.len());

        for table in &self.tables {
            let create: String = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                    [table],
                    |row| row.get(0),
                )
                .map_err(|e| DocQaError::config(format!("failed to read schema of {}: {}", table, e)))?;

            let sample = query_rows(&conn, &format!("SELECT * FROM {} LIMIT {}", quote_ident(table), SAMPLE_ROWS))
                .map_err(|e| DocQaError::config(format!("failed to sample {}: {}", table, e)))?;

            let mut section = format!("{}\n\n/*\n{} rows from {} table:\n", create, SAMPLE_ROWS, table);
            section.push_str(&sample.columns.join("\t"));
            for row in &sample.rows {
                section.push('\n');
                let cells: Vec<String> = row.iter().map(render_cell).collect();
                section.push_str(&cells.join("\t"));
            }
            section.push_str("\n*/");
            sections.push(section);
        }

        Ok(sections.join("\n\n"))
    }

    /// 쿼리 실행 (블로킹 스레드)
    pub async fn run(&self, sql: &str) -> Result<QueryResult> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| DocQaError::execution("database lock poisoned"))?;
            query_rows(&conn, &sql).map_err(|e| DocQaError::execution(e.to_string()))
        })
        .await
        .map_err(|e| DocQaError::execution(format!("query task failed: {}", e)))?
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DocQaError::execution("database lock poisoned"))
    }
}

fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .map_err(|e| DocQaError::config(format!("failed to list tables: {}", e)))?;

    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| DocQaError::config(format!("failed to list tables: {}", e)))?;

    Ok(names)
}

fn query_rows(conn: &Connection, sql: &str) -> rusqlite::Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows.next()? {
        if out.len() == MAX_RESULT_ROWS {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(to_json(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(QueryResult {
        columns,
        rows: out,
        truncated,
    })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// Tests
// ============================================================================
