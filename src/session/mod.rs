//! 세션 모듈 - 턴 처리와 REPL
//!
//! [`Session`]은 질문 하나를 답변 하나로 바꿉니다. 턴 단위 에러
//! (생성 실패, SQL 실행 실패, 에이전트 실패)는 답변 텍스트로 변환되고,
//! 인덱스/설정 에러만 `Err`로 올라가 세션을 끝냅니다.
//!
//! [`run_repl`]은 `BufRead`/`Write` 위의 얇은 입력 루프입니다.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;

use crate::agent::AgentExecutor;
use crate::error::{DocQaError, Result};
use crate::knowledge::Retriever;
use crate::llm::GenerationClient;
use crate::memory::ConversationMemory;
use crate::progress::{Spinner, DEFAULT_LABEL};
use crate::prompt::{assemble, PromptTemplate};
use crate::sql::SqlChain;

pub const QUESTION_PROMPT: &str = "> Question: ";
pub const QUERY_PROMPT: &str = "> Query: ";

// ============================================================================
// Session Trait
// ============================================================================

/// 턴 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub answer: String,
    /// 에러가 답변 텍스트로 변환되었는지
    pub degraded: bool,
}

impl TurnOutcome {
    pub fn answered(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            degraded: false,
        }
    }

    pub fn degraded(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            degraded: true,
        }
    }
}

/// 대화 세션
#[async_trait]
pub trait Session: Send {
    /// REPL 입력 프롬프트
    fn prompt(&self) -> &str {
        QUESTION_PROMPT
    }

    /// 질문 하나 처리. `Err`는 세션을 끝내야 하는 에러뿐입니다.
    async fn handle(&mut self, question: &str) -> Result<TurnOutcome>;
}

/// 턴 에러를 답변으로 변환 (치명적 에러는 그대로 반환)
fn degrade(error: DocQaError) -> Result<TurnOutcome> {
    if error.is_fatal() {
        return Err(error);
    }

    tracing::warn!("Turn failed: {}", error);
    let text = match error {
        DocQaError::Agent(reason) => format!("unable to complete the request ({})", reason),
        other => other.to_string(),
    };
    Ok(TurnOutcome::degraded(text))
}

// ============================================================================
// RagSession
// ============================================================================

/// 문서 QA 세션 (검색 → 프롬프트 조립 → 생성)
pub struct RagSession {
    retriever: Retriever,
    client: Arc<dyn GenerationClient>,
    template: PromptTemplate,
    memory: ConversationMemory,
}

impl RagSession {
    pub fn new(retriever: Retriever, client: Arc<dyn GenerationClient>, template: PromptTemplate) -> Self {
        Self {
            retriever,
            client,
            template,
            memory: ConversationMemory::new(),
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }
}

#[async_trait]
impl Session for RagSession {
    async fn handle(&mut self, question: &str) -> Result<TurnOutcome> {
        // 질의 임베딩 실패(쿼터, 네트워크)도 턴 단위 에러
        let context = match self.retriever.retrieve(question, None).await {
            Ok(context) => context,
            Err(e) => return degrade(e),
        };
        let prompt = assemble(&self.template, &context, &self.memory.as_sequence(), question);

        match self.client.complete(&prompt).await {
            Ok(answer) => {
                let answer = answer.trim().to_string();
                self.memory.append_exchange(question, answer.clone());
                Ok(TurnOutcome::answered(answer))
            }
            Err(e) => degrade(e),
        }
    }
}

// ============================================================================
// AgentSession
// ============================================================================

/// 툴 사용 에이전트 세션
pub struct AgentSession {
    executor: AgentExecutor,
    memory: ConversationMemory,
}

impl AgentSession {
    pub fn new(executor: AgentExecutor) -> Self {
        Self {
            executor,
            memory: ConversationMemory::new(),
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }
}

#[async_trait]
impl Session for AgentSession {
    fn prompt(&self) -> &str {
        QUERY_PROMPT
    }

    async fn handle(&mut self, question: &str) -> Result<TurnOutcome> {
        match self.executor.run(question, &self.memory.as_sequence()).await {
            Ok(outcome) => {
                tracing::debug!("Agent used {} steps", outcome.steps.len());
                self.memory.append_exchange(question, outcome.answer.clone());
                Ok(TurnOutcome::answered(outcome.answer))
            }
            Err(e) => degrade(e),
        }
    }
}

// ============================================================================
// SqlSession
// ============================================================================

/// NL-to-SQL 세션 (대화 기록 없음)
pub struct SqlSession {
    chain: SqlChain,
}

impl SqlSession {
    pub fn new(chain: SqlChain) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Session for SqlSession {
    async fn handle(&mut self, question: &str) -> Result<TurnOutcome> {
        match self.chain.answer(question).await {
            Ok(answer) => Ok(TurnOutcome::answered(format!(
                "{}\n\nSQL: {}",
                answer.explanation, answer.sql
            ))),
            Err(e) => degrade(e),
        }
    }
}

// ============================================================================
// REPL
// ============================================================================

/// 입력이 종료 명령인지 (`quit`, 대소문자/앞뒤 공백 무시)
pub fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("quit")
}

/// 입력 루프. `quit` 또는 EOF에서 정상 종료하고, 치명적 에러는 반환합니다.
pub async fn run_repl<R, W>(
    session: &mut dyn Session,
    mut input: R,
    output: &mut W,
    show_progress: bool,
) -> anyhow::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::new();

    loop {
        write!(output, "{}", session.prompt())?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line).context("Failed to read input")? == 0 {
            writeln!(output)?;
            break;
        }

        if is_quit(&line) {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        let started = Instant::now();
        let spinner = if show_progress {
            Spinner::start(DEFAULT_LABEL)
        } else {
            Spinner::disabled()
        };
        let result = session.handle(question).await;
        spinner.stop().await;

        let outcome = result?;
        writeln!(
            output,
            "> Answer (took {:.2} seconds): \n{}\n",
            started.elapsed().as_secs_f64(),
            outcome.answer
        )?;
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{CalculatorTool, ToolRegistry};
    use crate::embedding::{EmbeddingProvider, HashingEmbedding};
    use crate::knowledge::{Chunk, EmbeddingIndex};
    use crate::llm::testing::ScriptedClient;
    use crate::llm::{ChatResponse, ToolCallRequest};
    use crate::prompt::QA_TEMPLATE;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 한 번만 실패하도록 설정할 수 있는 임베더
    struct FlakyEmbedding {
        inner: HashingEmbedding,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(DocQaError::generation("embedding API error (429): quota"));
            }
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }
    }

    async fn flaky_retriever() -> (Retriever, Arc<FlakyEmbedding>) {
        let embedder = Arc::new(FlakyEmbedding {
            inner: HashingEmbedding::default(),
            fail_next: AtomicBool::new(false),
        });
        let chunks = vec![Chunk {
            document_id: "sky.txt".into(),
            sequence: 0,
            text: "The sky is blue.".into(),
        }];
        let index = EmbeddingIndex::build(chunks, embedder.clone()).await.unwrap();
        (Retriever::new(Arc::new(index), 1), embedder)
    }

    /// 질문을 그대로 되돌려주는 세션
    struct EchoSession {
        handled: Vec<String>,
    }

    #[async_trait]
    impl Session for EchoSession {
        async fn handle(&mut self, question: &str) -> Result<TurnOutcome> {
            self.handled.push(question.to_string());
            if question == "corrupt" {
                return Err(DocQaError::index("corrupted"));
            }
            Ok(TurnOutcome::answered(format!("echo: {}", question)))
        }
    }

    async fn retriever() -> Retriever {
        let chunks = vec![
            Chunk {
                document_id: "sky.txt".into(),
                sequence: 0,
                text: "The sky is blue.".into(),
            },
            Chunk {
                document_id: "grass.txt".into(),
                sequence: 0,
                text: "Grass is green.".into(),
            },
        ];
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedding::default());
        Retriever::new(Arc::new(EmbeddingIndex::build(chunks, embedder).await.unwrap()), 1)
    }

    #[test]
    fn test_is_quit() {
        assert!(is_quit("quit\n"));
        assert!(is_quit("  QuIt  "));
        assert!(!is_quit("quit now"));
        assert!(!is_quit(""));
    }

    #[tokio::test]
    async fn test_repl_stops_at_quit() {
        let mut session = EchoSession { handled: vec![] };
        let input = Cursor::new("first\n\nQUIT\nnever\n");
        let mut output = Vec::new();

        run_repl(&mut session, input, &mut output, false).await.unwrap();

        assert_eq!(session.handled, vec!["first"]);
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("> Answer (took "));
        assert!(text.contains("echo: first"));
        assert!(!text.contains("never"));
        // first, 빈 줄, quit에서 각각 프롬프트 출력
        assert_eq!(text.matches(QUESTION_PROMPT).count(), 3);
    }

    #[tokio::test]
    async fn test_repl_ends_at_eof() {
        let mut session = EchoSession { handled: vec![] };
        let mut output = Vec::new();
        run_repl(&mut session, Cursor::new("only"), &mut output, false)
            .await
            .unwrap();
        assert_eq!(session.handled, vec!["only"]);
    }

    #[tokio::test]
    async fn test_repl_propagates_fatal_errors() {
        let mut session = EchoSession { handled: vec![] };
        let mut output = Vec::new();
        let result = run_repl(&mut session, Cursor::new("corrupt\nnext\n"), &mut output, false).await;
        assert!(result.is_err());
        assert_eq!(session.handled, vec!["corrupt"]);
    }

    #[tokio::test]
    async fn test_rag_session_answers_and_remembers() {
        let client = Arc::new(ScriptedClient::texts(&["Blue.", "Still blue."]));
        let template = PromptTemplate::qa(QA_TEMPLATE).unwrap();
        let mut session = RagSession::new(retriever().await, client.clone(), template);

        let outcome = session.handle("What color is the sky?").await.unwrap();
        assert_eq!(outcome, TurnOutcome::answered("Blue."));
        session.handle("Are you sure?").await.unwrap();
        assert_eq!(session.memory().len(), 4);

        let requests = client.requests.lock().unwrap();
        let first = requests[0].messages[0].content.clone().unwrap();
        assert!(first.contains("The sky is blue."));
        assert!(!first.contains("Grass is green."));

        let second = requests[1].messages[0].content.clone().unwrap();
        assert!(second.contains("Human: What color is the sky?\nAssistant: Blue."));
    }

    #[tokio::test]
    async fn test_rag_session_generation_failure_is_answer() {
        let client = Arc::new(ScriptedClient::new(vec![Err(DocQaError::generation("timeout"))]));
        let template = PromptTemplate::qa(QA_TEMPLATE).unwrap();
        let mut session = RagSession::new(retriever().await, client, template);

        let outcome = session.handle("sky?").await.unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.answer, "generation failed: timeout");
        assert!(session.memory().is_empty());
    }

    #[tokio::test]
    async fn test_rag_session_retrieval_failure_is_answer() {
        let (retriever, embedder) = flaky_retriever().await;
        let client = Arc::new(ScriptedClient::texts(&["Blue."]));
        let template = PromptTemplate::qa(QA_TEMPLATE).unwrap();
        let mut session = RagSession::new(retriever, client.clone(), template);

        embedder.fail_next.store(true, Ordering::SeqCst);
        let outcome = session.handle("sky?").await.unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.answer, "generation failed: embedding API error (429): quota");
        assert!(session.memory().is_empty());
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_repl_continues_after_retrieval_failure() {
        let (retriever, embedder) = flaky_retriever().await;
        let client = Arc::new(ScriptedClient::texts(&["Blue."]));
        let template = PromptTemplate::qa(QA_TEMPLATE).unwrap();
        let mut session = RagSession::new(retriever, client.clone(), template);

        embedder.fail_next.store(true, Ordering::SeqCst);
        let mut output = Vec::new();
        run_repl(
            &mut session,
            Cursor::new("sky?\nsecond\nquit\n"),
            &mut output,
            false,
        )
        .await
        .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("generation failed: embedding API error (429): quota"));
        assert!(text.contains("Blue."));
        assert_eq!(text.matches(QUESTION_PROMPT).count(), 3);
        assert_eq!(client.request_count(), 1);
        assert_eq!(session.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_agent_session_degrades_on_loop() {
        let responses = (0..5)
            .map(|i| {
                Ok(ChatResponse {
                    content: None,
                    tool_calls: vec![ToolCallRequest {
                        id: format!("c{}", i),
                        name: "calculator".into(),
                        arguments: r#"{"expression":"1+1"}"#.into(),
                    }],
                })
            })
            .collect();
        let client = Arc::new(ScriptedClient::new(responses));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool));
        let mut session = AgentSession::new(AgentExecutor::new(client, registry, 2));

        assert_eq!(session.prompt(), QUERY_PROMPT);
        let outcome = session.handle("loop").await.unwrap();
        assert!(outcome.degraded);
        assert!(outcome.answer.starts_with("unable to complete the request ("));
        assert!(session.memory().is_empty());
    }
}
