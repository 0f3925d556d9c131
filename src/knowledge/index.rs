//! Embedding Index - 빌드/영속화/로드/검색
//!
//! 상태 전이: `Unbuilt → Built → (Persisted ↔ Loaded)`.
//! Unbuilt 상태는 값으로 존재하지 않고, [`EmbeddingIndex::build`] 또는
//! [`EmbeddingIndex::load`]로만 인덱스를 얻을 수 있습니다.
//!
//! 디스크 레이아웃:
//! ```text
//! <index_path>/
//!   manifest.json   형식 버전, 임베더 이름/차원, 청크 수, 코퍼스 지문
//!   vectors/        LanceDB (chunks 테이블)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, Result};

use super::chunker::{split_documents, Chunker};
use super::document::{Chunk, Document};
use super::lance::LanceIndexStorage;
use super::vector::{top_k, IndexStorage, ScoredChunk, VectorEntry};

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_DIR: &str = "vectors";
const FORMAT_VERSION: u32 = 1;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// 메모리에서 방금 빌드됨
    Built,
    /// 디스크에 기록됨
    Persisted,
    /// 디스크에서 읽어옴
    Loaded,
}

/// 영속화 매니페스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedder: String,
    pub dimension: usize,
    pub chunk_count: usize,
    /// 청크 텍스트의 SHA-256 지문
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// 인덱스 통계
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub document_count: usize,
    pub dimension: usize,
    pub embedder: String,
}

// ============================================================================
// EmbeddingIndex
// ============================================================================

/// 청크 임베딩 인덱스
///
/// 전수 코사인 검색이며, 동점은 삽입 순서로 정렬됩니다.
pub struct EmbeddingIndex {
    entries: Vec<VectorEntry>,
    embedder: Arc<dyn EmbeddingProvider>,
    storage: Arc<dyn IndexStorage>,
    state: IndexState,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("entries", &self.entries.len())
            .field("embedder", &self.embedder.name())
            .field("storage", &self.storage.name())
            .field("state", &self.state)
            .finish()
    }
}

impl EmbeddingIndex {
    /// 청크 전체를 임베딩하여 인덱스 빌드 (LanceDB 영속화)
    pub async fn build(chunks: Vec<Chunk>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::build_with_storage(chunks, embedder, Arc::new(LanceIndexStorage::new())).await
    }

    /// 영속화 백엔드를 지정하여 빌드
    ///
    /// 모든 청크의 임베딩이 끝난 뒤에만 인덱스를 돌려줍니다.
    pub async fn build_with_storage(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn EmbeddingProvider>,
        storage: Arc<dyn IndexStorage>,
    ) -> Result<Self> {
        tracing::info!(
            "Building index over {} chunks with {}",
            chunks.len(),
            embedder.name()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| DocQaError::index(format!("failed to embed chunks: {}", e)))?;

        if embeddings.len() != chunks.len() {
            return Err(DocQaError::index(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimension = embedder.dimension();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
            return Err(DocQaError::index(format!(
                "embedder {} returned a {}-dimensional vector, expected {}",
                embedder.name(),
                bad.len(),
                dimension
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry { chunk, embedding })
            .collect();

        Ok(Self {
            entries,
            embedder,
            storage,
            state: IndexState::Built,
        })
    }

    /// 디스크에 기록
    ///
    /// 임시 디렉토리에 먼저 쓰고 마지막에 이름을 바꿔서,
    /// 경로가 존재하면 완전한 인덱스임을 보장합니다.
    pub async fn persist(&mut self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(DocQaError::index(format!(
                "refusing to overwrite existing index at {:?}; delete it to rebuild",
                path
            )));
        }

        let staging = staging_path(path);
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging)
                .await
                .map_err(|e| DocQaError::index(format!("failed to clear {:?}: {}", staging, e)))?;
        }

        self.storage
            .save(&staging.join(VECTORS_DIR), &self.entries)
            .await
            .map_err(|e| DocQaError::index(format!("failed to persist vectors: {:#}", e)))?;

        let manifest = self.manifest();
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| DocQaError::index(format!("failed to encode manifest: {}", e)))?;
        tokio::fs::write(staging.join(MANIFEST_FILE), json)
            .await
            .map_err(|e| DocQaError::index(format!("failed to write manifest: {}", e)))?;

        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| DocQaError::index(format!("failed to finalize index: {}", e)))?;

        self.state = IndexState::Persisted;
        tracing::info!("Persisted index ({} chunks) to {:?}", self.entries.len(), path);
        Ok(())
    }

    /// 디스크에서 로드 (LanceDB)
    pub async fn load(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::load_with_storage(path, embedder, Arc::new(LanceIndexStorage::new())).await
    }

    /// 영속화 백엔드를 지정하여 로드
    ///
    /// 매니페스트의 임베더 이름/차원이 현재 임베더와 다르면 에러입니다.
    pub async fn load_with_storage(
        path: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        storage: Arc<dyn IndexStorage>,
    ) -> Result<Self> {
        let manifest = read_manifest(path).await?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(DocQaError::index(format!(
                "unsupported index format version {} at {:?}",
                manifest.format_version, path
            )));
        }

        if manifest.embedder != embedder.name() || manifest.dimension != embedder.dimension() {
            return Err(DocQaError::index(format!(
                "index at {:?} was built with {} ({} dims) but the configured embedder is {} ({} dims); \
                 delete the index directory to rebuild",
                path,
                manifest.embedder,
                manifest.dimension,
                embedder.name(),
                embedder.dimension()
            )));
        }

        let entries = storage
            .load(&path.join(VECTORS_DIR))
            .await
            .map_err(|e| DocQaError::index(format!("failed to load vectors: {:#}", e)))?;

        if entries.len() != manifest.chunk_count {
            return Err(DocQaError::index(format!(
                "index at {:?} is corrupted: manifest lists {} chunks, found {}",
                path,
                manifest.chunk_count,
                entries.len()
            )));
        }

        let index = Self {
            entries,
            embedder,
            storage,
            state: IndexState::Loaded,
        };

        if index.fingerprint() != manifest.fingerprint {
            return Err(DocQaError::index(format!(
                "index at {:?} is corrupted: fingerprint mismatch",
                path
            )));
        }

        tracing::info!("Loaded index ({} chunks) from {:?}", index.len(), path);
        Ok(index)
    }

    /// 텍스트와 가장 유사한 상위 k개 청크
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.embedder.embed(text).await?;

        if query_vector.len() != self.embedder.dimension() {
            return Err(DocQaError::index(format!(
                "query vector has {} dimensions, index expects {}",
                query_vector.len(),
                self.embedder.dimension()
            )));
        }

        Ok(top_k(&self.entries, &query_vector, k))
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        let mut documents: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.chunk.document_id.as_str())
            .collect();
        documents.sort_unstable();
        documents.dedup();

        IndexStats {
            chunk_count: self.entries.len(),
            document_count: documents.len(),
            dimension: self.embedder.dimension(),
            embedder: self.embedder.name().to_string(),
        }
    }

    fn manifest(&self) -> IndexManifest {
        IndexManifest {
            format_version: FORMAT_VERSION,
            embedder: self.embedder.name().to_string(),
            dimension: self.embedder.dimension(),
            chunk_count: self.entries.len(),
            fingerprint: self.fingerprint(),
            created_at: Utc::now(),
        }
    }

    /// 청크 식별자와 텍스트의 SHA-256
    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.chunk.document_id.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.chunk.sequence.to_le_bytes());
            hasher.update(entry.chunk.text.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// 매니페스트 읽기
pub async fn read_manifest(path: &Path) -> Result<IndexManifest> {
    let manifest_path = path.join(MANIFEST_FILE);
    let raw = tokio::fs::read(&manifest_path)
        .await
        .map_err(|e| DocQaError::index(format!("failed to read {:?}: {}", manifest_path, e)))?;

    serde_json::from_slice(&raw)
        .map_err(|e| DocQaError::index(format!("corrupted manifest {:?}: {}", manifest_path, e)))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".partial");
    path.with_file_name(name)
}

// ============================================================================
// Orchestration
// ============================================================================

/// 인덱스 원천 문서 공급자
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// 코퍼스 전체 로드 (개별 파일 실패는 내부에서 건너뜀)
    async fn load_documents(&self) -> Result<Vec<Document>>;
}

/// 인덱스를 얻은 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// 영속화된 인덱스가 없어 새로 빌드하고 기록함
    Built,
    /// 기존 영속화 인덱스를 로드함
    Loaded,
}

/// 영속화된 인덱스가 있으면 로드하고, 없으면 한 번 빌드 후 기록
///
/// 경로의 존재 여부만으로 판단하며, 로드 실패 시 재빌드하지 않습니다.
pub async fn open_or_build(
    path: &Path,
    source: &dyn DocumentSource,
    chunker: &dyn Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<(EmbeddingIndex, IndexOrigin)> {
    if path.exists() {
        tracing::info!("Found existing index at {:?}", path);
        let index = EmbeddingIndex::load(path, embedder).await?;
        return Ok((index, IndexOrigin::Loaded));
    }

    tracing::info!("No index at {:?}; building from corpus", path);
    let documents = source.load_documents().await?;
    let batch = split_documents(chunker, &documents);
    for err in &batch.errors {
        tracing::warn!("{}", err);
    }

    let mut index = EmbeddingIndex::build(batch.chunks, embedder).await?;
    index.persist(path).await?;
    Ok((index, IndexOrigin::Built))
}

// ============================================================================
// Tests
// ============================================================================
