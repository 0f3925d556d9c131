//! 프롬프트 모듈 - 타입이 있는 템플릿과 조립
//!
//! 템플릿은 생성 시점에 한 번 파싱되며, 알 수 없는 플레이스홀더나
//! 필수 플레이스홀더 누락은 모델 호출 전에 설정 에러가 됩니다.
//! `{{` / `}}`는 리터럴 중괄호입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let template = PromptTemplate::qa(QA_TEMPLATE)?;
//! let prompt = assemble(&template, &chunks, &history, "What color is the sky?")?;
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{DocQaError, Result};
use crate::knowledge::ScoredChunk;
use crate::memory::{ConversationTurn, Role};

// ============================================================================
// Built-in Templates
// ============================================================================

/// 문서 QA 템플릿
pub const QA_TEMPLATE: &str = "Use the following pieces of context to craft a comprehensive \
answer for the question at the end. As a helpful assistant, your answers should be concise \
and accurate. Avoid providing fabricated information if uncertain; simply acknowledge the \
lack of knowledge.

{context}

Chat History:
{chat_history}

Question: {question}
Helpful Answer:";

/// SQL 생성 템플릿
pub const SQL_QUERY_TEMPLATE: &str = "You are a SQLite expert. Given an input question, \
create a syntactically correct SQLite query to run. Query only the tables listed below, \
never modify data, and return at most {top_k} rows unless the question asks otherwise. \
Wrap table and column names in double quotes.

Only use the following tables:
{schema}

Question: {question}
Return only the SQL query, with no explanation.
SQLQuery:";

/// SQL 결과 설명 템플릿
pub const SQL_ANSWER_TEMPLATE: &str = "Given the following user question, corresponding SQL \
query, and SQL result, answer the user question.

Question: {question}
SQL Query: {query}
SQL Result: {result}
Answer: ";

/// QA 템플릿에 쓸 수 있는 플레이스홀더
pub const QA_VARIABLES: &[&str] = &["context", "question", "chat_history"];

// ============================================================================
// PromptTemplate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
}

/// 파싱된 프롬프트 템플릿
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").expect("Invalid regex"))
}

impl PromptTemplate {
    /// QA 템플릿 (`{context}`, `{question}`, `{chat_history}`; `{question}` 필수)
    pub fn qa(text: &str) -> Result<Self> {
        Self::with_variables(text, QA_VARIABLES, &["question"])
    }

    /// 허용/필수 플레이스홀더를 지정하여 파싱
    pub fn with_variables(text: &str, allowed: &[&str], required: &[&str]) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in token_pattern().captures_iter(text) {
            let whole = caps.get(0).map(|m| (m.start(), m.end(), m.as_str()));
            let Some((start, end, token)) = whole else {
                continue;
            };
            literal.push_str(&text[last..start]);
            last = end;

            match token {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                _ => {
                    let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                    if !allowed.contains(&name) {
                        return Err(DocQaError::config(format!(
                            "unknown prompt placeholder '{{{}}}' (allowed: {})",
                            name,
                            allowed.join(", ")
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(name.to_string()));
                }
            }
        }
        literal.push_str(&text[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let template = Self { segments };
        for name in required {
            if !template.has_placeholder(name) {
                return Err(DocQaError::config(format!(
                    "prompt template is missing required placeholder '{{{}}}'",
                    name
                )));
            }
        }

        Ok(template)
    }

    pub fn has_placeholder(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Slot(n) if n == name))
    }

    /// 값 치환 (값이 없는 플레이스홀더는 빈 문자열)
    pub fn render(&self, values: &HashMap<&str, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => {
                    if let Some(value) = values.get(name.as_str()) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// 청크 텍스트를 순위 순서대로 개행으로 연결 (잘라내지 않음)
pub fn render_context(context: &[ScoredChunk]) -> String {
    context
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 대화 기록을 오래된 순으로 `Human:` / `Assistant:` 줄로 렌더링
pub fn render_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("Human: {}", turn.text),
            Role::Assistant => format!("Assistant: {}", turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 컨텍스트, 기록, 질문으로 최종 프롬프트 조립
pub fn assemble(
    template: &PromptTemplate,
    context: &[ScoredChunk],
    history: &[ConversationTurn],
    question: &str,
) -> String {
    let mut values = HashMap::new();
    values.insert("context", render_context(context));
    values.insert("question", question.to_string());
    if template.has_placeholder("chat_history") {
        values.insert("chat_history", render_history(history));
    }
    template.render(&values)
}

// ============================================================================
// Tests
// ============================================================================
