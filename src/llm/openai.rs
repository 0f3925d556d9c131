//! OpenAI 호환 채팅 클라이언트
//!
//! `POST {base_url}/chat/completions`, function calling 지원.
//! ref: https://platform.openai.com/docs/api-reference/chat

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{DocQaError, Result};

use super::{ChatMessage, ChatRequest, ChatResponse, GenerationClient, MessageRole, ToolCallRequest};

/// OpenAI 채팅 클라이언트
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocQaError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            client,
        })
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: MessageRole,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

fn function_type() -> String {
    "function".to_string()
}

fn to_wire_message(message: &ChatMessage) -> WireMessage<'_> {
    WireMessage {
        role: message.role,
        content: message.content.as_deref(),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                kind: function_type(),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.as_deref(),
    }
}

fn parse_response(body: &str) -> Result<ChatResponse> {
    let response: WireResponse = serde_json::from_str(body)
        .map_err(|e| DocQaError::generation(format!("malformed chat response: {}", e)))?;

    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| DocQaError::generation("chat response has no choices"))?;

    Ok(ChatResponse {
        content: message.content.filter(|c| !c.is_empty()),
        tool_calls: message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect(),
    })
}

#[async_trait]
impl GenerationClient for OpenAiChat {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let wire = WireRequest {
            model: &self.model,
            messages: request.messages.iter().map(to_wire_message).collect(),
            temperature: request.temperature.unwrap_or(self.temperature),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
        };

        tracing::debug!(
            "Chat request: {} messages, {} tools",
            wire.messages.len(),
            wire.tools.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DocQaError::generation("chat request timed out")
                } else {
                    DocQaError::generation(format!("failed to send chat request: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DocQaError::generation(format!("failed to read chat response: {}", e)))?;

        if !status.is_success() {
            return Err(DocQaError::generation(format!(
                "chat API error ({}): {}",
                status, body
            )));
        }

        parse_response(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
