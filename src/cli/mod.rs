//! CLI 모듈
//!
//! docqa CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::agent::{
    AgentExecutor, CalculatorTool, DocumentSearchTool, SqlQueryTool, ToolRegistry, WebSearchTool,
};
use crate::collector::DirectoryLoader;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::knowledge::{
    open_or_build, read_manifest, recursive_chunker, EmbeddingIndex, IndexOrigin, Retriever,
};
use crate::llm::{GenerationClient, OpenAiChat};
use crate::prompt::{PromptTemplate, QA_TEMPLATE};
use crate::session::{run_repl, AgentSession, RagSession, Session, SqlSession};
use crate::sql::{SqlChain, SqliteDatabase};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version, about = "문서 기반 대화형 질의응답", long_about = None)]
pub struct Cli {
    /// 문서 폴더 (DOCS_DIR 대신)
    #[arg(long, global = true)]
    pub docs_dir: Option<PathBuf>,

    /// 인덱스 경로 (INDEX_PATH 대신)
    #[arg(long, global = true)]
    pub index_path: Option<PathBuf>,

    /// 스피너 끄기
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 질의응답 (질문이 없으면 대화 모드)
    Ask {
        /// 한 번만 묻고 종료할 질문
        question: Option<String>,
    },

    /// 툴 사용 에이전트 대화
    Agent,

    /// 자연어 → SQL 질의
    Sql,

    /// 인덱스 빌드 또는 로드
    Index {
        /// 기존 인덱스를 지우고 다시 빌드
        #[arg(long)]
        rebuild: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.docs_dir {
        config.index.docs_dir = dir;
    }
    if let Some(path) = cli.index_path {
        config.index.index_path = path;
    }
    let progress = !cli.no_progress;

    match cli.command {
        Commands::Ask { question } => cmd_ask(&config, question, progress).await,
        Commands::Agent => cmd_agent(&config, progress).await,
        Commands::Sql => cmd_sql(&config, progress).await,
        Commands::Index { rebuild } => cmd_index(&config, rebuild).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 질의응답 명령어 (ask)
async fn cmd_ask(config: &Config, question: Option<String>, progress: bool) -> Result<()> {
    // 템플릿은 모델 호출 전에 검증
    let template = PromptTemplate::qa(QA_TEMPLATE)?;
    let client = chat_client(config)?;
    let index = open_index(config).await?;
    let retriever = Retriever::new(Arc::new(index), config.index.top_k);

    let mut session = RagSession::new(retriever, client, template);

    if let Some(question) = question {
        let outcome = session.handle(&question).await?;
        println!("{}", outcome.answer);
        return Ok(());
    }

    repl(&mut session, progress).await
}

/// 에이전트 명령어 (agent)
async fn cmd_agent(config: &Config, progress: bool) -> Result<()> {
    let client = chat_client(config)?;

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculatorTool));

    if let Some(key) = &config.agent.tavily_api_key {
        registry.register(Arc::new(WebSearchTool::new(key.clone())?));
    } else {
        println!("[!] TAVILY_API_KEY 미설정: web_search 툴 비활성");
    }

    if config.index.index_path.exists() || config.index.docs_dir.exists() {
        let index = open_index(config).await?;
        let retriever = Retriever::new(Arc::new(index), config.index.top_k);
        registry.register(Arc::new(DocumentSearchTool::new(retriever)));
    } else {
        println!("[!] 문서/인덱스 없음: document_search 툴 비활성");
    }

    if let Some(path) = &config.database.path {
        let database = SqliteDatabase::open(path, &config.database.tables)?;
        registry.register(Arc::new(SqlQueryTool::new(Arc::new(database))));
    }

    println!("[*] 툴: {}", registry.names().join(", "));

    let executor = AgentExecutor::new(client, registry, config.agent.max_iterations);
    let mut session = AgentSession::new(executor);
    repl(&mut session, progress).await
}

/// SQL 질의 명령어 (sql)
async fn cmd_sql(config: &Config, progress: bool) -> Result<()> {
    let client = chat_client(config)?;
    let path = config.require_database()?;
    let database = SqliteDatabase::open(path, &config.database.tables)?;

    println!(
        "[*] 데이터베이스: {} (테이블: {})",
        path.display(),
        config.database.tables.join(", ")
    );

    let chain = SqlChain::new(client, Arc::new(database))?;
    let mut session = SqlSession::new(chain);
    repl(&mut session, progress).await
}

/// 인덱스 명령어 (index)
async fn cmd_index(config: &Config, rebuild: bool) -> Result<()> {
    let path = &config.index.index_path;

    if rebuild && path.exists() {
        println!("[*] 기존 인덱스 삭제: {}", path.display());
        tokio::fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to remove index at {:?}", path))?;
    }

    let index = open_index(config).await?;
    let stats = index.stats();
    println!(
        "     문서 {} 건, 청크 {} 개, 임베딩 {} ({}차원)",
        stats.document_count, stats.chunk_count, stats.embedder, stats.dimension
    );
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &Config) -> Result<()> {
    println!("docqa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if config.llm.api_key.is_some() {
        println!("[OK] OPENAI_API_KEY: 설정됨 (모델: {})", config.llm.model);
    } else {
        println!("[!] OPENAI_API_KEY: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    let docs_dir = &config.index.docs_dir;
    if docs_dir.is_dir() {
        println!("[OK] 문서 폴더: {}", docs_dir.display());
    } else {
        println!("[!] 문서 폴더 없음: {}", docs_dir.display());
    }

    print_index_status(&config.index.index_path).await;

    match &config.database.path {
        Some(path) => println!(
            "[*] 데이터베이스: {} (테이블: {})",
            path.display(),
            config.database.tables.join(", ")
        ),
        None => println!("[!] DB_PATH: 미설정"),
    }

    if config.agent.tavily_api_key.is_some() {
        println!("[OK] TAVILY_API_KEY: 설정됨");
    } else {
        println!("[!] TAVILY_API_KEY: 미설정");
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn chat_client(config: &Config) -> Result<Arc<dyn GenerationClient>> {
    let api_key = config.require_llm_key()?.to_string();
    Ok(Arc::new(OpenAiChat::new(api_key, &config.llm)?))
}

/// 인덱스 로드 (없으면 문서 폴더에서 빌드 후 저장)
async fn open_index(config: &Config) -> Result<EmbeddingIndex> {
    let embedder = create_embedder(config)?;
    let chunker = recursive_chunker(config.index.chunking.clone())?;
    let loader = DirectoryLoader::from_config(&config.index);
    let path = &config.index.index_path;

    if !path.exists() {
        println!(
            "[*] 인덱스 빌드 중: {} → {}",
            config.index.docs_dir.display(),
            path.display()
        );
    }

    let (index, origin) = open_or_build(path, &loader, chunker.as_ref(), embedder)
        .await
        .context("Failed to open index")?;

    match origin {
        IndexOrigin::Built => println!("[OK] 인덱스 생성: {} 청크", index.len()),
        IndexOrigin::Loaded => println!("[OK] 인덱스 로드: {} 청크", index.len()),
    }

    Ok(index)
}

async fn repl(session: &mut dyn Session, progress: bool) -> Result<()> {
    println!("[*] 종료하려면 quit 입력");
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    run_repl(session, stdin.lock(), &mut stdout, progress).await
}

async fn print_index_status(path: &Path) {
    if !path.exists() {
        println!("[!] 인덱스 없음: {} (첫 질의 시 빌드)", path.display());
        return;
    }

    match read_manifest(path).await {
        Ok(manifest) => {
            println!("[OK] 인덱스: {}", path.display());
            println!(
                "     청크 {} 개, 임베딩 {} ({}차원), 생성 {}",
                manifest.chunk_count,
                manifest.embedder,
                manifest.dimension,
                manifest.created_at.format("%Y-%m-%d %H:%M")
            );
        }
        Err(e) => println!("[!] 인덱스 읽기 실패: {}", e),
    }
}
