//! 문서 검색 / SQL 툴
//!
//! 기존 파이프라인 컴포넌트를 에이전트 툴로 노출합니다.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::knowledge::Retriever;
use crate::sql::{validate_sql, SqliteDatabase};

use super::{required_str, Tool};

// ============================================================================
// document_search
// ============================================================================

/// 인덱스 검색 툴
#[derive(Debug, Clone)]
pub struct DocumentSearchTool {
    retriever: Retriever,
}

impl DocumentSearchTool {
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        "document_search"
    }

    fn description(&self) -> &str {
        "Search the indexed study documents and return the most relevant passages."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to look for"},
                "k": {"type": "integer", "minimum": 1, "description": "Number of passages"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let query = required_str(&args, "query")?;
        let k = match args.get("k") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .filter(|k| *k > 0)
                    .ok_or_else(|| anyhow::anyhow!("'k' must be a positive integer"))?
                    as usize,
            ),
        };

        let results = self.retriever.retrieve(query, k).await?;
        if results.is_empty() {
            return Ok("No relevant passages found.".to_string());
        }

        Ok(results
            .iter()
            .map(|r| {
                format!(
                    "[{}#{} score={:.3}]\n{}",
                    r.chunk.document_id, r.chunk.sequence, r.score, r.chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

// ============================================================================
// sql_query
// ============================================================================

/// 읽기 전용 SQL 실행 툴
#[derive(Debug, Clone)]
pub struct SqlQueryTool {
    database: Arc<SqliteDatabase>,
    description: String,
}

impl SqlQueryTool {
    pub fn new(database: Arc<SqliteDatabase>) -> Self {
        let description = format!(
            "Run a read-only SQLite SELECT query. Available tables: {}.",
            database.tables().join(", ")
        );
        Self {
            database,
            description,
        }
    }
}

#[async_trait]
impl Tool for SqlQueryTool {
    fn name(&self) -> &str {
        "sql_query"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "A single SELECT statement"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String> {
        let sql = crate::sql::clean_sql(required_str(&args, "query")?);
        validate_sql(&sql, self.database.tables())?;
        Ok(self.database.run(&sql).await?.render())
    }
}
