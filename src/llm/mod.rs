//! LLM 모듈 - 채팅 완성 클라이언트
//!
//! [`GenerationClient`]는 상태가 없는 채팅 완성 래퍼입니다.
//! 재시도 루프가 없으며, 모든 실패는 `Generation` 에러입니다.
//! 기본 구현은 OpenAI 호환 `/chat/completions` 엔드포인트입니다.

mod openai;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{DocQaError, Result};

pub use openai::OpenAiChat;

// ============================================================================
// Message Types
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// 모델이 요청한 툴 호출
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// 호출 ID (툴 결과 메시지와 짝을 맞춤)
    pub id: String,
    pub name: String,
    /// 모델이 만든 JSON 인자 문자열 (유효하지 않을 수 있음)
    pub arguments: String,
}

/// 채팅 메시지
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: Option<String>,
    /// assistant 메시지의 툴 호출
    pub tool_calls: Vec<ToolCallRequest>,
    /// tool 메시지가 응답하는 호출 ID
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// 툴 호출만 담은 assistant 메시지
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// 툴 실행 결과 메시지
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: vec![],
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// 모델에 노출하는 툴 선언
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema (`type: "object"`)
    pub parameters: serde_json::Value,
}

/// 채팅 요청
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDeclaration>,
    /// None이면 클라이언트 기본 온도
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// 채팅 응답
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
        }
    }
}

// ============================================================================
// GenerationClient Trait
// ============================================================================

/// 채팅 완성 클라이언트 트레이트
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// 메시지 목록으로 한 번 호출
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// 단일 프롬프트 완성 (user 메시지 하나)
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .chat(ChatRequest::new(vec![ChatMessage::user(prompt)]))
            .await?;
        response
            .content
            .ok_or_else(|| DocQaError::generation("model returned no text"))
    }

    /// 모델 이름
    fn model(&self) -> &str;
}

// ============================================================================
// Test Support
// ============================================================================
