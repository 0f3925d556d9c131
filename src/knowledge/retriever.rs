//! Retriever - 질의를 순위가 매겨진 컨텍스트 청크로 변환

use std::sync::Arc;

use crate::error::Result;

use super::index::EmbeddingIndex;
use super::vector::ScoredChunk;

/// 인덱스 검색 래퍼
///
/// 세션과 `document_search` 툴이 같은 인덱스를 공유합니다.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
    top_k: usize,
}

impl Retriever {
    /// `top_k`는 호출자가 k를 생략했을 때 쓰는 기본값 (최소 1)
    pub fn new(index: Arc<EmbeddingIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
        }
    }

    /// 상위 k개 청크 (점수 내림차순, 최대 k개)
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let k = k.unwrap_or(self.top_k);
        let results = self.index.query(query, k).await?;

        tracing::debug!(
            "Retrieved {} chunks for query ({} chars)",
            results.len(),
            query.chars().count()
        );
        Ok(results)
    }

    pub fn default_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }
}
