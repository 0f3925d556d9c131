//! NL-to-SQL 모듈
//!
//! 질문 → SQL 생성 → 검증 → 읽기 전용 실행 → 자연어 설명.
//! 1단계에서 검증을 통과한 SQL이 그대로 실행되고 반환됩니다.

mod database;
mod validate;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::llm::GenerationClient;
use crate::prompt::{PromptTemplate, SQL_ANSWER_TEMPLATE, SQL_QUERY_TEMPLATE};

pub use database::{QueryResult, SqliteDatabase, MAX_RESULT_ROWS};
pub use validate::{clean_sql, validate_sql};

#[cfg(test)]
pub(crate) use database::tests::create_test_db;

/// 생성 프롬프트에 넣는 기본 결과 행 수 힌트
const DEFAULT_ROW_HINT: usize = 5;

/// NL-to-SQL 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlAnswer {
    /// 실행된 SQL
    pub sql: String,
    /// 렌더링된 결과 (JSON 배열)
    pub result: String,
    pub explanation: String,
}

/// NL-to-SQL 체인
pub struct SqlChain {
    client: Arc<dyn GenerationClient>,
    database: Arc<SqliteDatabase>,
    schema: String,
    query_template: PromptTemplate,
    answer_template: PromptTemplate,
}

impl SqlChain {
    /// 체인 생성 (스키마는 한 번 읽어 캐시)
    pub fn new(client: Arc<dyn GenerationClient>, database: Arc<SqliteDatabase>) -> Result<Self> {
        let query_template =
            PromptTemplate::with_variables(SQL_QUERY_TEMPLATE, &["schema", "question", "top_k"], &["question"])?;
        let answer_template = PromptTemplate::with_variables(
            SQL_ANSWER_TEMPLATE,
            &["question", "query", "result"],
            &["question", "query", "result"],
        )?;
        let schema = database.schema_description()?;

        Ok(Self {
            client,
            database,
            schema,
            query_template,
            answer_template,
        })
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.database
    }

    /// 질문에 대한 SQL 생성 (정리 + 검증까지)
    pub async fn generate_sql(&self, question: &str) -> Result<String> {
        let mut values = HashMap::new();
        values.insert("schema", self.schema.clone());
        values.insert("question", question.to_string());
        values.insert("top_k", DEFAULT_ROW_HINT.to_string());

        let raw = self
            .client
            .complete(&self.query_template.render(&values))
            .await?;
        let sql = clean_sql(&raw);
        validate_sql(&sql, self.database.tables())?;

        tracing::debug!("Generated SQL: {}", sql);
        Ok(sql)
    }

    /// 질문 → SQL → 결과 → 설명
    pub async fn answer(&self, question: &str) -> Result<SqlAnswer> {
        let sql = self.generate_sql(question).await?;
        let result = self.database.run(&sql).await?.render();

        let mut values = HashMap::new();
        values.insert("question", question.to_string());
        values.insert("query", sql.clone());
        values.insert("result", result.clone());

        let explanation = self
            .client
            .complete(&self.answer_template.render(&values))
            .await?
            .trim()
            .to_string();

        Ok(SqlAnswer {
            sql,
            result,
            explanation,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocQaError;
    use crate::llm::testing::ScriptedClient;
    use tempfile::TempDir;

    fn chain(dir: &std::path::Path, client: Arc<ScriptedClient>) -> SqlChain {
        let path = create_test_db(dir);
        let tables = vec!["users".to_string(), "orders".to_string()];
        let database = Arc::new(SqliteDatabase::open(&path, &tables).unwrap());
        SqlChain::new(client, database).unwrap()
    }

    #[tokio::test]
    async fn test_answer_executes_generated_sql() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::texts(&[
            "```sql\nSELECT COUNT(*) AS n FROM users;\n```",
            "There are 4 users.",
        ]));
        let chain = chain(temp_dir.path(), client.clone());

        let answer = chain.answer("How many users are there?").await.unwrap();
        assert_eq!(answer.sql, "SELECT COUNT(*) AS n FROM users");
        assert_eq!(answer.result, r#"[{"n":4}]"#);
        assert_eq!(answer.explanation, "There are 4 users.");

        let requests = client.requests.lock().unwrap();
        let generation_prompt = requests[0].messages[0].content.clone().unwrap();
        assert!(generation_prompt.contains("CREATE TABLE users"));
        assert!(!generation_prompt.contains("tenants"));

        let explain_prompt = requests[1].messages[0].content.clone().unwrap();
        assert!(explain_prompt.contains("SQL Query: SELECT COUNT(*) AS n FROM users"));
        assert!(explain_prompt.contains(r#"SQL Result: [{"n":4}]"#));
    }

    #[tokio::test]
    async fn test_disallowed_table_is_not_executed() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::texts(&["SELECT * FROM tenants"]));
        let chain = chain(temp_dir.path(), client.clone());

        let err = chain.answer("Show tenants").await.unwrap_err();
        assert!(matches!(err, DocQaError::Generation(_)));
        // 설명 호출 없음
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_execution_failure() {
        let temp_dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::texts(&["SELECT nme FROM users"]));
        let chain = chain(temp_dir.path(), client.clone());

        let err = chain.answer("names?").await.unwrap_err();
        assert!(matches!(err, DocQaError::Execution(_)));
        assert_eq!(client.request_count(), 1);
    }
}
