//! Text Chunking Module
//!
//! 정규화된 문서 텍스트를 고정 크기 청크로 분할합니다.
//! 윈도우 안에서 문단 → 줄 → 문장 → 단어 경계 순으로 분할 지점을 찾고,
//! 경계가 없으면 문자 단위로 자릅니다.
//!
//! 크기와 오버랩은 모두 문자(char) 수 기준입니다.

use crate::error::{DocQaError, Result};

use super::document::{Chunk, Document};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 연속 청크 간 공유 문자 수
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkConfig {
    /// 오버랩 없는 설정
    pub fn for_fast() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 0,
        }
    }

    /// 설정 검증 (`0 <= overlap < chunk_size`)
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DocQaError::config("chunk size must be > 0"));
        }
        if self.overlap >= self.chunk_size {
            return Err(DocQaError::config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

/// 문서 배치 분할 결과
#[derive(Debug, Default)]
pub struct ChunkBatch {
    pub chunks: Vec<Chunk>,
    /// 건너뛴 문서의 수집 에러
    pub errors: Vec<DocQaError>,
}

/// 문서 목록을 청크로 분할
///
/// 텍스트가 아닌 문서는 에러로 보고하고 제외하며, 나머지 배치는 계속 처리합니다.
pub fn split_documents(chunker: &dyn Chunker, documents: &[Document]) -> ChunkBatch {
    let mut batch = ChunkBatch::default();

    for doc in documents {
        if doc.text.contains('\0') {
            tracing::warn!("Skipping non-text document: {}", doc.source_id);
            batch.errors.push(DocQaError::ingestion(
                &doc.source_id,
                "document contains binary (NUL) content",
            ));
            continue;
        }

        for (sequence, text) in chunker.chunk(&doc.text).into_iter().enumerate() {
            batch.chunks.push(Chunk {
                document_id: doc.source_id.clone(),
                sequence,
                text,
            });
        }
    }

    tracing::debug!(
        "Split {} documents into {} chunks ({} skipped)",
        documents.len(),
        batch.chunks.len(),
        batch.errors.len()
    );
    batch
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 분할 경계 우선순위 (문단, 줄, 문장, 단어)
const SEPARATORS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "? ", "! "], &[" "]];

/// 경계 우선 청커
///
/// 각 청크는 `chunk_size` 문자 이하이고, 다음 청크는 이전 청크 끝의
/// `overlap` 문자로 시작합니다.
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    /// 설정으로 생성 (잘못된 설정은 에러)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// `[start, start + chunk_size]` 윈도우에서 청크 끝 위치 결정
    ///
    /// 반환값은 항상 `start + overlap`보다 커서 다음 시작점이 전진합니다.
    fn find_break(&self, chars: &[char], start: usize) -> usize {
        let max_end = start + self.config.chunk_size;
        let min_end = start + self.config.overlap + 1;
        // 윈도우 앞쪽의 경계는 너무 작은 청크를 만들므로 뒤쪽 절반만 본다
        let preferred_min = min_end.max(start + self.config.chunk_size / 2);

        for level in SEPARATORS {
            let best = level
                .iter()
                .filter_map(|sep| rfind_end(chars, sep, preferred_min, max_end))
                .max();
            if let Some(end) = best {
                return end;
            }
        }

        max_end
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.config.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            if start + self.config.chunk_size >= chars.len() {
                chunks.push(chars[start..].iter().collect());
                break;
            }

            let end = self.find_break(&chars, start);
            chunks.push(chars[start..end].iter().collect());
            start = end - self.config.overlap;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 구분자가 끝나는 위치 중 `[min_end, max_end]`에 드는 가장 큰 값
fn rfind_end(chars: &[char], sep: &str, min_end: usize, max_end: usize) -> Option<usize> {
    let sep: Vec<char> = sep.chars().collect();
    let max_end = max_end.min(chars.len());
    if max_end < min_end || max_end < sep.len() {
        return None;
    }

    (min_end.max(sep.len())..=max_end)
        .rev()
        .find(|&end| chars[end - sep.len()..end] == sep[..])
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

/// 설정을 지정한 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(RecursiveChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkConfig {
            chunk_size,
            overlap,
        })
        .unwrap()
    }

    fn sample_text() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Paragraph {} talks about topic {}. It has two sentences.",
                    i,
                    i % 7
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn tail(s: &str, n: usize) -> String {
        let chars: Vec<char> = s.chars().collect();
        chars[chars.len() - n..].iter().collect()
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = RecursiveChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\n ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = RecursiveChunker::with_defaults();
        let chunks = chunker.chunk("The sky is blue.");
        assert_eq!(chunks, vec!["The sky is blue.".to_string()]);
    }

    #[test]
    fn test_size_bound() {
        let text = sample_text();
        for (size, overlap) in [(100, 0), (100, 20), (57, 13), (300, 200)] {
            for c in chunker(size, overlap).chunk(&text) {
                assert!(c.chars().count() <= size, "chunk too long for {}", size);
            }
        }
    }

    #[test]
    fn test_exact_overlap() {
        let text = sample_text();
        let overlap = 25;
        let chunks = chunker(120, overlap).chunk(&text);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let shared = tail(&pair[0], overlap);
            assert!(
                pair[1].starts_with(&shared),
                "next chunk must start with the previous {} chars",
                overlap
            );
        }
    }

    #[test]
    fn test_no_overlap_reassembles() {
        let text = sample_text();
        let chunks = chunker(150, 0).chunk(&text);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(70), "b".repeat(70));
        let chunks = chunker(100, 0).chunk(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with("\n\n"));
        assert_eq!(chunks[1], "b".repeat(70));
    }

    #[test]
    fn test_hard_split_without_separators() {
        let text = "x".repeat(250);
        let chunks = chunker(100, 10).chunk(&text);
        assert_eq!(chunks[0].chars().count(), 100);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "안녕하세요 세계. ".repeat(40);
        let chunks = chunker(50, 5).chunk(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = sample_text();
        let c = chunker(90, 15);
        assert_eq!(c.chunk(&text), c.chunk(&text));
    }

    #[test]
    fn test_invalid_config() {
        assert!(RecursiveChunker::new(ChunkConfig {
            chunk_size: 0,
            overlap: 0
        })
        .is_err());
        assert!(RecursiveChunker::new(ChunkConfig {
            chunk_size: 100,
            overlap: 100
        })
        .is_err());
    }

    #[test]
    fn test_split_documents_skips_binary() {
        let docs = vec![
            Document::new("good.txt", "The sky is blue."),
            Document::new("bad.pdf", "abc\0def"),
            Document::new("empty.txt", ""),
        ];
        let batch = split_documents(&RecursiveChunker::with_defaults(), &docs);

        assert_eq!(batch.chunks.len(), 1);
        assert_eq!(batch.chunks[0].document_id, "good.txt");
        assert_eq!(batch.chunks[0].sequence, 0);
        assert_eq!(batch.errors.len(), 1);
        assert!(matches!(batch.errors[0], DocQaError::Ingestion { .. }));
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(ChunkConfig::default().overlap, 200);
        assert_eq!(ChunkConfig::for_fast().overlap, 0);
    }
}
