//! 에이전트 실행기
//!
//! 질문 하나에 대해 `Start → (Reasoning → ToolCall → ToolResult)* → FinalAnswer`.
//! 모델 호출 한 번이 반복 한 번이며, `max_iterations`를 넘기면 `Agent` 에러입니다.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{DocQaError, Result};
use crate::llm::{ChatMessage, ChatRequest, GenerationClient, ToolCallRequest};
use crate::memory::{ConversationTurn, Role};

use super::ToolRegistry;

/// 기본 시스템 지시문
pub const DEFAULT_AGENT_SYSTEM_PROMPT: &str = "You are a helpful study assistant named TURTY.";

/// 에이전트 기본 온도
const AGENT_TEMPERATURE: f32 = 0.2;

/// 스크래치패드 항목
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStep {
    ToolCall {
        call_id: String,
        tool: String,
        arguments: String,
        result: String,
    },
    FinalAnswer {
        text: String,
    },
}

/// 에이전트 실행 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutcome {
    pub answer: String,
    pub steps: Vec<AgentStep>,
}

/// 툴 사용 에이전트
pub struct AgentExecutor {
    client: Arc<dyn GenerationClient>,
    registry: ToolRegistry,
    system_prompt: String,
    max_iterations: usize,
    temperature: f32,
}

impl AgentExecutor {
    pub fn new(client: Arc<dyn GenerationClient>, registry: ToolRegistry, max_iterations: usize) -> Self {
        Self {
            client,
            registry,
            system_prompt: DEFAULT_AGENT_SYSTEM_PROMPT.to_string(),
            max_iterations: max_iterations.max(1),
            temperature: AGENT_TEMPERATURE,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 질문 하나를 최종 답변까지 실행
    pub async fn run(&self, question: &str, history: &[ConversationTurn]) -> Result<AgentOutcome> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(&self.system_prompt));
        for turn in history {
            messages.push(match turn.role {
                Role::User => ChatMessage::user(&turn.text),
                Role::Assistant => ChatMessage::assistant(&turn.text),
            });
        }
        messages.push(ChatMessage::user(question));

        let declarations = self.registry.declarations();
        let mut steps = Vec::new();

        for iteration in 1..=self.max_iterations {
            let request = ChatRequest::new(messages.clone())
                .with_tools(declarations.clone())
                .with_temperature(self.temperature);
            let response = self.client.chat(request).await?;

            if response.tool_calls.is_empty() {
                let text = response.content.ok_or_else(|| {
                    DocQaError::agent("model returned neither an answer nor a tool call")
                })?;
                tracing::debug!("Agent finished after {} iterations", iteration);
                steps.push(AgentStep::FinalAnswer { text: text.clone() });
                return Ok(AgentOutcome {
                    answer: text,
                    steps,
                });
            }

            messages.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));

            // 모델이 낸 순서대로 하나씩 실행
            for call in response.tool_calls {
                let result = self.invoke_tool(&call).await;
                messages.push(ChatMessage::tool_result(&call.id, &result));
                steps.push(AgentStep::ToolCall {
                    call_id: call.id,
                    tool: call.name,
                    arguments: call.arguments,
                    result,
                });
            }
        }

        tracing::warn!(
            "Agent stopped after {} iterations without a final answer",
            self.max_iterations
        );
        Err(DocQaError::agent(format!(
            "no final answer within {} iterations",
            self.max_iterations
        )))
    }

    /// 툴 호출 실행. 실패는 `error: …` 문자열로 되먹임
    async fn invoke_tool(&self, call: &ToolCallRequest) -> String {
        let Some(tool) = self.registry.get(&call.name) else {
            tracing::warn!("Model requested unknown tool '{}'", call.name);
            return format!(
                "error: unknown tool '{}'. Available tools: {}",
                call.name,
                self.registry.names().join(", ")
            );
        };

        let args: Value = if call.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(args) => args,
                Err(e) => return format!("error: invalid JSON arguments: {}", e),
            }
        };

        tracing::info!("Invoking tool {} ({})", call.name, call.id);
        match tool.invoke(args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Tool {} failed: {:#}", call.name, e);
                format!("error: {:#}", e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
