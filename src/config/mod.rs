//! 설정 모듈
//!
//! 환경변수(및 `.env` 파일)에서 설정을 한 번 읽어 [`Config`]를 만듭니다.
//! 각 컴포넌트는 생성 시 `&Config`를 받으며, 컴포넌트 내부에서
//! 환경변수를 직접 조회하지 않습니다.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{DocQaError, Result};
use crate::knowledge::ChunkConfig;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_MAX_ITERATIONS: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// 원본 스키마의 허용 테이블 목록
pub const DEFAULT_SQL_TABLES: &[&str] = &["user", "tenant", "project", "projectDataSource"];

// ============================================================================
// Config Types
// ============================================================================

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// OpenAI embeddings API
    OpenAi,
    /// 로컬 해싱 임베딩 (네트워크 없음)
    LocalHash,
}

impl EmbeddingBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "local-hash" | "local" => Ok(Self::LocalHash),
            other => Err(DocQaError::config(format!(
                "unknown embedding provider '{}' (expected openai or local-hash)",
                other
            ))),
        }
    }
}

/// LLM 설정
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// 임베딩 설정
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub batch_size: usize,
    pub max_retries: u32,
}

/// 인덱스/검색 설정
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub docs_dir: PathBuf,
    pub index_path: PathBuf,
    pub chunking: ChunkConfig,
    pub top_k: usize,
    /// PDF만 인덱싱
    pub pdf_only: bool,
}

/// NL-to-SQL 대상 DB 설정
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub tables: Vec<String>,
}

/// 에이전트 설정
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub tavily_api_key: Option<String>,
}

/// 전체 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub database: DatabaseConfig,
    pub agent: AgentConfig,
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// `.env` 로드 후 프로세스 환경변수에서 설정 생성
    pub fn from_env() -> Result<Self> {
        match dotenv::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(DocQaError::config(format!("failed to read .env: {}", e))),
        }

        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// 주어진 키-값 맵에서 설정 생성 (테스트 가능하도록 환경과 분리)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into());
        url::Url::parse(&base_url)
            .map_err(|e| DocQaError::config(format!("OPENAI_BASE_URL is not a valid URL: {}", e)))?;

        let llm = LlmConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: get("DOCQA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            temperature: parse_or(vars, "DOCQA_TEMPERATURE", 0.0)?,
            timeout_secs: parse_or(vars, "DOCQA_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
        };

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(DocQaError::config("DOCQA_TEMPERATURE must be in [0.0, 2.0]"));
        }

        let embedding = EmbeddingConfig {
            backend: get("DOCQA_EMBEDDING_PROVIDER")
                .map(|v| EmbeddingBackend::parse(&v))
                .transpose()?
                .unwrap_or(EmbeddingBackend::OpenAi),
            model: get("DOCQA_EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            batch_size: parse_or(vars, "DOCQA_EMBEDDING_BATCH_SIZE", 64)?,
            max_retries: parse_or(vars, "DOCQA_EMBEDDING_MAX_RETRIES", 3)?,
        };

        let defaults = ChunkConfig::default();
        let chunking = ChunkConfig {
            chunk_size: parse_or(vars, "DOCQA_CHUNK_SIZE", defaults.chunk_size)?,
            overlap: parse_or(vars, "DOCQA_CHUNK_OVERLAP", defaults.overlap)?,
        };
        chunking.validate()?;

        let index = IndexConfig {
            docs_dir: get("DOCS_DIR").map(PathBuf::from).unwrap_or_else(|| "documents".into()),
            index_path: get("INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| "vectorStore".into()),
            chunking,
            top_k: parse_or(vars, "DOCQA_TOP_K", DEFAULT_TOP_K)?,
            pdf_only: parse_or(vars, "DOCQA_PDF_ONLY", false)?,
        };

        if index.top_k == 0 {
            return Err(DocQaError::config("DOCQA_TOP_K must be >= 1"));
        }

        let database = DatabaseConfig {
            path: get("DB_PATH").map(PathBuf::from),
            tables: get("DB_TABLES")
                .map(|v| {
                    v.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| DEFAULT_SQL_TABLES.iter().map(|t| t.to_string()).collect()),
        };

        let agent = AgentConfig {
            max_iterations: parse_or(vars, "DOCQA_MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS)?,
            tavily_api_key: get("TAVILY_API_KEY"),
        };

        if agent.max_iterations == 0 {
            return Err(DocQaError::config("DOCQA_MAX_ITERATIONS must be >= 1"));
        }

        Ok(Self {
            llm,
            embedding,
            index,
            database,
            agent,
        })
    }

    /// LLM API 키 (없으면 설정 에러)
    pub fn require_llm_key(&self) -> Result<&str> {
        self.llm.api_key.as_deref().ok_or_else(|| {
            DocQaError::config(
                "OPENAI_API_KEY is not set.\n\
                 Set: export OPENAI_API_KEY=your-api-key (or add it to .env)",
            )
        })
    }

    /// NL-to-SQL 대상 DB 경로 (없으면 설정 에러)
    pub fn require_database(&self) -> Result<&PathBuf> {
        self.database
            .path
            .as_ref()
            .ok_or_else(|| DocQaError::config("DB_PATH is not set"))
    }
}

/// 숫자형 환경변수 파싱 (없으면 기본값, 형식 오류는 설정 에러)
fn parse_or<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| DocQaError::config(format!("{}='{}' is invalid: {}", key, raw, e))),
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================
