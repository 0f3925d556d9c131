//! Knowledge 모듈 - 문서 인덱싱과 검색
//!
//! - Document: 추출 결과 정규화 (세그먼트 → 평문)
//! - Chunker: 경계 우선순위 기반 재귀 분할 (고정 overlap)
//! - Index: 임베딩 인덱스 빌드/영속화/로드, 전수 코사인 검색
//! - LanceDB: 인덱스 영속화 백엔드
//! - Retriever: 질의 → 상위 k개 청크

mod chunker;
mod document;
mod index;
mod lance;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, recursive_chunker, split_documents, ChunkBatch, ChunkConfig, Chunker,
    RecursiveChunker,
};
pub use document::{Chunk, Document, RawDocument};
pub use index::{
    open_or_build, read_manifest, DocumentSource, EmbeddingIndex, IndexManifest, IndexOrigin,
    IndexState, IndexStats,
};
pub use lance::LanceIndexStorage;
pub use retriever::Retriever;
pub use vector::{cosine_similarity, top_k, IndexStorage, ScoredChunk, VectorEntry};
