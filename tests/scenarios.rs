//! 공개 API만으로 문서 QA / 인덱스 / SQL / 에이전트 흐름 검증

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa::agent::CalculatorTool;
use docqa::collector::DirectoryLoader;
use docqa::knowledge::{read_manifest, recursive_chunker, IndexState};
use docqa::llm::ToolCallRequest;
use docqa::session::QUESTION_PROMPT;
use docqa::{
    open_or_build, run_repl, AgentExecutor, ChatRequest, ChatResponse, ChunkConfig, DocQaError,
    Document, DocumentSource, EmbeddingProvider, GenerationClient, HashingEmbedding, IndexOrigin,
    PromptTemplate, RagSession, Result, Retriever, Session, SqlChain, SqlSession, SqliteDatabase,
    ToolRegistry, QA_TEMPLATE,
};
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

struct FakeClient {
    responses: Mutex<VecDeque<ChatResponse>>,
    prompts: Mutex<Vec<ChatRequest>>,
}

impl FakeClient {
    fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(vec![]),
        })
    }

    fn texts(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| ChatResponse::text(*t)).collect())
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].messages[0]
            .content
            .clone()
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationClient for FakeClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.prompts.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DocQaError::generation("no scripted response"))
    }

    fn model(&self) -> &str {
        "fake"
    }
}

struct CountingLoader {
    inner: DirectoryLoader,
    loads: AtomicUsize,
}

#[async_trait]
impl DocumentSource for CountingLoader {
    async fn load_documents(&self) -> Result<Vec<Document>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_documents().await
    }
}

fn embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbedding::default())
}

fn write_corpus(dir: &Path) {
    std::fs::write(dir.join("sky.txt"), "The sky is blue.").unwrap();
    std::fs::write(dir.join("grass.md"), "# Grass\n\nGrass is green.").unwrap();
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn answers_from_retrieved_context() {
    let docs = TempDir::new().unwrap();
    write_corpus(docs.path());
    let index_dir = TempDir::new().unwrap();
    let index_path = index_dir.path().join("index");

    let loader = DirectoryLoader::new(docs.path());
    let chunker = recursive_chunker(ChunkConfig::default()).unwrap();
    let (index, origin) = open_or_build(&index_path, &loader, chunker.as_ref(), embedder())
        .await
        .unwrap();
    assert_eq!(origin, IndexOrigin::Built);

    let client = FakeClient::texts(&["The sky is blue."]);
    let retriever = Retriever::new(Arc::new(index), 1);
    let template = PromptTemplate::qa(QA_TEMPLATE).unwrap();
    let mut session = RagSession::new(retriever, client.clone(), template);

    let mut output = Vec::new();
    run_repl(
        &mut session,
        Cursor::new("What color is the sky?\nquit\n"),
        &mut output,
        false,
    )
    .await
    .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("> Answer (took "));
    assert!(text.contains("The sky is blue."));
    assert_eq!(text.matches(QUESTION_PROMPT).count(), 2);

    assert_eq!(client.calls(), 1);
    let prompt = client.prompt(0);
    assert!(prompt.contains("The sky is blue."));
    assert!(prompt.contains("Question: What color is the sky?"));
    assert_eq!(session.memory().len(), 2);
}

#[tokio::test]
async fn index_is_built_once_then_loaded() {
    let docs = TempDir::new().unwrap();
    write_corpus(docs.path());
    let index_dir = TempDir::new().unwrap();
    let index_path = index_dir.path().join("index");

    let loader = CountingLoader {
        inner: DirectoryLoader::new(docs.path()),
        loads: AtomicUsize::new(0),
    };
    let chunker = recursive_chunker(ChunkConfig::default()).unwrap();

    let (built, first) = open_or_build(&index_path, &loader, chunker.as_ref(), embedder())
        .await
        .unwrap();
    let (loaded, second) = open_or_build(&index_path, &loader, chunker.as_ref(), embedder())
        .await
        .unwrap();

    assert_eq!(first, IndexOrigin::Built);
    assert_eq!(second, IndexOrigin::Loaded);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(loaded.state(), IndexState::Loaded);
    assert_eq!(built.len(), loaded.len());

    let manifest = read_manifest(&index_path).await.unwrap();
    assert_eq!(manifest.chunk_count, loaded.len());

    let a = built.query("sky", 1).await.unwrap();
    let b = loaded.query("sky", 1).await.unwrap();
    assert_eq!(a[0].chunk.text, b[0].chunk.text);
}

#[tokio::test]
async fn sql_allow_list_blocks_other_tables() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("app.db");
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO users (name) VALUES ('ana'), ('bo');
             CREATE TABLE tenants (id INTEGER PRIMARY KEY, secret TEXT);
             INSERT INTO tenants (secret) VALUES ('hidden');",
        )
        .unwrap();
    }

    let database = SqliteDatabase::open(&db_path, &["users".to_string()]).unwrap();
    let client = FakeClient::texts(&["SELECT secret FROM tenants"]);
    let chain = SqlChain::new(client.clone(), Arc::new(database)).unwrap();
    let mut session = SqlSession::new(chain);

    let outcome = session.handle("Show me the tenant secrets").await.unwrap();

    assert!(outcome.degraded);
    assert!(outcome.answer.contains("tenants"));
    assert!(!outcome.answer.contains("hidden"));
    // 설명 단계까지 가지 않음
    assert_eq!(client.calls(), 1);
    assert!(!client.prompt(0).contains("CREATE TABLE tenants"));
}

#[tokio::test]
async fn sql_session_answers_with_query() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("app.db");
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO users (name) VALUES ('ana'), ('bo');",
        )
        .unwrap();
    }

    let database = SqliteDatabase::open(&db_path, &["users".to_string()]).unwrap();
    let client = FakeClient::texts(&["SQLQuery: SELECT COUNT(*) AS n FROM users;", "There are 2 users."]);
    let chain = SqlChain::new(client.clone(), Arc::new(database)).unwrap();
    let mut session = SqlSession::new(chain);

    let outcome = session.handle("How many users?").await.unwrap();

    assert!(!outcome.degraded);
    assert_eq!(
        outcome.answer,
        "There are 2 users.\n\nSQL: SELECT COUNT(*) AS n FROM users"
    );
    assert!(client.prompt(1).contains(r#"[{"n":2}]"#));
}

#[tokio::test]
async fn agent_stops_at_iteration_limit() {
    let responses = (0..10)
        .map(|i| ChatResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: format!("call_{}", i),
                name: "calculator".into(),
                arguments: r#"{"expression":"2*3"}"#.into(),
            }],
        })
        .collect();
    let client = FakeClient::new(responses);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculatorTool));

    let executor = AgentExecutor::new(client.clone(), registry, 3);
    let err = executor.run("loop forever", &[]).await.unwrap_err();

    assert!(matches!(err, DocQaError::Agent(_)));
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn agent_answers_after_tool_call() {
    let client = FakeClient::new(vec![
        ChatResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "call_1".into(),
                name: "calculator".into(),
                arguments: r#"{"expression":"6*7"}"#.into(),
            }],
        },
        ChatResponse::text("The answer is 42."),
    ]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculatorTool));

    let executor = AgentExecutor::new(client.clone(), registry, 5);
    let outcome = executor.run("What is 6 times 7?", &[]).await.unwrap();

    assert_eq!(outcome.answer, "The answer is 42.");
    assert_eq!(outcome.steps.len(), 2);
    assert_eq!(client.calls(), 2);
}
