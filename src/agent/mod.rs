//! 에이전트 모듈 - 툴 레지스트리와 추론 루프
//!
//! 모델이 툴 호출을 요청하면 순서대로 실행해 결과를 되먹이고,
//! 최종 답변이 나오거나 반복 한도에 도달할 때까지 반복합니다.
//!
//! ## 기본 툴
//! - `calculator`: 산술식 계산
//! - `web_search`: Tavily 웹 검색
//! - `document_search`: 인덱스 검색
//! - `sql_query`: 허용 목록 기반 읽기 전용 SQL

mod calculator;
mod executor;
mod tools;
mod web_search;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDeclaration;

pub use calculator::{evaluate, CalculatorTool};
pub use executor::{AgentExecutor, AgentOutcome, AgentStep, DEFAULT_AGENT_SYSTEM_PROMPT};
pub use tools::{DocumentSearchTool, SqlQueryTool};
pub use web_search::{WebSearchTool, TAVILY_BASE_URL};

// ============================================================================
// Tool Trait
// ============================================================================

/// 에이전트 툴 트레이트
///
/// 실패는 에이전트 루프에서 `error: …` 결과로 모델에 되먹여집니다.
#[async_trait]
pub trait Tool: Send + Sync {
    /// 툴 이름 (소문자 + 밑줄)
    fn name(&self) -> &str;

    /// 모델이 툴 선택에 쓰는 한 줄 설명
    fn description(&self) -> &str;

    /// 인자 JSON Schema (`type: "object"`)
    fn parameters_schema(&self) -> Value;

    /// 툴 실행
    async fn invoke(&self, args: Value) -> Result<String>;
}

// ============================================================================
// ToolRegistry
// ============================================================================

/// 이름으로 조회하는 툴 목록
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 툴 등록 (같은 이름이면 교체)
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!("Tool '{}' registered twice; keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// 모델에 보낼 툴 선언 (이름순)
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .values()
            .map(|tool| ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// 인자 객체에서 필수 문자열 필드 추출
pub(crate) fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required string argument '{}'", field))
}
