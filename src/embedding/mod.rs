//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 프로바이더 트레이트와 구현체입니다.
//! - [`OpenAiEmbedding`]: OpenAI embeddings API (배치 + 429/5xx 재시도)
//! - [`HashingEmbedding`]: 네트워크 없이 동작하는 결정적 해싱 임베딩
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod hashing;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, EmbeddingBackend};
use crate::error::Result;

pub use hashing::{HashingEmbedding, DEFAULT_HASH_DIMENSION};
pub use openai::OpenAiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 인덱스 빌드와 쿼리에 같은 프로바이더를 써야 합니다.
/// 이름과 차원은 인덱스 매니페스트에 기록되어 로드 시 비교됩니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 식별자 (모델 이름 포함)
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.backend {
        EmbeddingBackend::OpenAi => {
            let api_key = config.require_llm_key()?.to_string();
            Arc::new(OpenAiEmbedding::new(
                api_key,
                &config.llm.base_url,
                &config.embedding,
            )?)
        }
        EmbeddingBackend::LocalHash => Arc::new(HashingEmbedding::new(DEFAULT_HASH_DIMENSION)),
    };

    tracing::info!(
        "Using embedding provider {} (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
