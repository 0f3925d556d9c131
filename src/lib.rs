//! docqa - 문서 기반 대화형 질의응답
//!
//! 문서 폴더를 청크로 나눠 임베딩 인덱스(LanceDB 영속화)를 만들고,
//! 검색한 컨텍스트와 대화 기록으로 LLM 답변을 생성합니다.
//! 툴 사용 에이전트와 자연어 → SQL 파이프라인을 함께 제공합니다.

pub mod agent;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod progress;
pub mod prompt;
pub mod session;
pub mod sql;

// Re-exports
pub use agent::{AgentExecutor, AgentOutcome, AgentStep, Tool, ToolRegistry};
pub use config::Config;
pub use embedding::{create_embedder, EmbeddingProvider, HashingEmbedding, OpenAiEmbedding};
pub use error::{DocQaError, Result};
pub use knowledge::{
    open_or_build, Chunk, ChunkConfig, Chunker, Document, DocumentSource, EmbeddingIndex,
    IndexOrigin, RecursiveChunker, Retriever, ScoredChunk,
};
pub use llm::{ChatMessage, ChatRequest, ChatResponse, GenerationClient, OpenAiChat};
pub use memory::{ConversationMemory, ConversationTurn, Role};
pub use prompt::{assemble, PromptTemplate, QA_TEMPLATE};
pub use session::{run_repl, AgentSession, RagSession, Session, SqlSession, TurnOutcome};
pub use sql::{SqlAnswer, SqlChain, SqliteDatabase};
