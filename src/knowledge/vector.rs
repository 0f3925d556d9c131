//! Vector Store - 벡터 저장 트레이트 및 유틸리티
//!
//! 인덱스는 메모리에서 전수 코사인 검색을 수행하고,
//! 영속화는 [`IndexStorage`] 구현체(LanceDB)에 맡깁니다.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::document::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub chunk: Chunk,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// IndexStorage Trait
// ============================================================================

/// 인덱스 영속화 백엔드 트레이트 (async)
///
/// `load(save(entries))`는 같은 순서의 같은 엔트리를 돌려줘야 합니다.
#[async_trait]
pub trait IndexStorage: Send + Sync {
    /// 엔트리 전체를 디렉토리에 기록
    async fn save(&self, dir: &Path, entries: &[VectorEntry]) -> Result<()>;

    /// 디렉토리에서 엔트리 전체를 삽입 순서대로 읽기
    async fn load(&self, dir: &Path) -> Result<Vec<VectorEntry>>;

    /// 백엔드 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 상위 k개 검색
///
/// 유사도 내림차순, 동점이면 삽입 순서(먼저 들어온 엔트리)가 앞섭니다.
/// NaN 유사도는 가장 낮은 점수(`-inf`)로 취급합니다.
pub fn top_k(entries: &[VectorEntry], query: &[f32], k: usize) -> Vec<ScoredChunk> {
    if k == 0 {
        return vec![];
    }

    let mut scored: Vec<(usize, f32)> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let score = cosine_similarity(&e.embedding, query);
            (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    scored
        .into_iter()
        .take(k)
        .map(|(i, score)| ScoredChunk {
            chunk: entries[i].chunk.clone(),
            score,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
