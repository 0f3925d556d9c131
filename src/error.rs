//! 에러 타입
//!
//! 파이프라인 전 구간에서 쓰는 에러 분류입니다.
//! CLI 진입점은 `anyhow`로 감싸서 사용하고, 턴 단위 에러는
//! 세션 경계에서 답변 텍스트로 변환됩니다.

use thiserror::Error;

/// docqa 결과 타입
pub type Result<T> = std::result::Result<T, DocQaError>;

/// docqa 에러 분류
#[derive(Debug, Error)]
pub enum DocQaError {
    /// 읽을 수 없거나 텍스트가 아닌 문서 (파일 단위로 건너뜀)
    #[error("ingestion error for {source_id}: {message}")]
    Ingestion { source_id: String, message: String },

    /// 잘못된 설정, 누락된 자격 증명, 잘못된 템플릿 (시작 시 치명적)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 인덱스 빌드/로드/검색 실패 (세션 치명적, 자동 재빌드 없음)
    #[error("index error: {0}")]
    Index(String),

    /// LLM 호출 실패 또는 허용되지 않은 SQL 생성
    #[error("generation failed: {0}")]
    Generation(String),

    /// SQL 실행 실패
    #[error("query failed: {0}")]
    Execution(String),

    /// 에이전트 반복 한도 초과 또는 복구 불가능한 툴 실패
    #[error("agent error: {0}")]
    Agent(String),
}

impl DocQaError {
    pub fn ingestion(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent(message.into())
    }

    /// 프로세스를 종료해야 하는 에러인지 (설정/인덱스)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Index(_))
    }
}
