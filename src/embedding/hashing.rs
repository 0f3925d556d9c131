//! 해싱 임베딩
//!
//! 토큰을 SHA-256으로 해싱해 고정 차원 버킷에 부호 있는 카운트를 누적하고
//! L2 정규화합니다. 의미 임베딩은 아니지만 어휘가 겹치는 텍스트끼리
//! 코사인 유사도가 높게 나오며, 오프라인 실행과 테스트에 사용합니다.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::EmbeddingProvider;

/// 기본 차원
pub const DEFAULT_HASH_DIMENSION: usize = 256;

/// 결정적 해싱 임베딩
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
    name: String,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            name: format!("local-hash-{}", dimension),
        }
    }

    /// 동기 임베딩 계산
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 소문자 영숫자 토큰 분리
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[test]
    fn test_dimension_and_norm() {
        let embedder = HashingEmbedding::new(64);
        let v = embedder.embed_sync("The sky is blue.");
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = HashingEmbedding::default().embed_sync("  ...  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_lexical_overlap_ranks_higher() {
        let embedder = HashingEmbedding::default();
        let question = embedder.embed_sync("What color is the sky?");
        let related = embedder.embed_sync("The sky is blue.");
        let unrelated = embedder.embed_sync("Haskell compiles with GHC.");

        assert!(
            cosine_similarity(&question, &related) > cosine_similarity(&question, &unrelated)
        );
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashingEmbedding::default();
        let a = embedder.embed("same text").await.unwrap();
        let b = embedder.embed("Same TEXT").await.unwrap();
        assert_eq!(a, b);
    }
}
