//! 문서 수집 모듈
//!
//! 문서 폴더를 재귀로 훑어 지원하는 파일(PDF/Markdown/텍스트)을 모으고,
//! [`DirectoryLoader`]가 추출과 정규화를 거쳐 [`Document`]로 만듭니다.
//! .gitignore 패턴을 존중하며, 파일 단위 실패는 경고 후 건너뜁니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;

use crate::config::IndexConfig;
use crate::error::DocQaError;
use crate::extractor::ContentExtractor;
use crate::knowledge::{Document, DocumentSource};

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 평문/마크다운
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" | "txt" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 파일에서 CollectedFile 생성 (지원하지 않는 확장자는 None)
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let file_type = match FileType::from_path(&path) {
            Some(ft) => ft,
            None => return Ok(None),
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            file_type,
            size: metadata.len(),
        }))
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// PDF만 수집
    pub pdf_only: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
            pdf_only: false,
        }
    }
}

/// 파일 수집기
#[derive(Debug, Clone, Default)]
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 폴더 재귀 수집 (경로 순으로 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.exists() {
            anyhow::bail!("Directory not found: {:?}", path);
        }

        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to collect file: {}", e),
            }
        }

        // 빌드 결과가 디렉토리 순회 순서에 좌우되지 않도록
        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("Collected {} files from {:?}", files.len(), path);
        Ok(files)
    }

    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }

        if self.config.pdf_only && file.file_type != FileType::Pdf {
            return false;
        }

        true
    }
}

// ============================================================================
// Directory Loader
// ============================================================================

/// 문서 폴더 로더
///
/// 각 파일의 source_id는 루트 기준 상대 경로입니다.
pub struct DirectoryLoader {
    root: PathBuf,
    collector: FileCollector,
    extractor: ContentExtractor,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_collector(root, FileCollector::default())
    }

    pub fn with_collector(root: impl Into<PathBuf>, collector: FileCollector) -> Self {
        Self {
            root: root.into(),
            collector,
            extractor: ContentExtractor::new(),
        }
    }

    /// 인덱스 설정의 문서 폴더와 수집 옵션으로 생성
    pub fn from_config(config: &IndexConfig) -> Self {
        let collector = FileCollector::new(CollectorConfig {
            pdf_only: config.pdf_only,
            ..Default::default()
        });
        Self::with_collector(&config.docs_dir, collector)
    }

    fn source_id(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[async_trait]
impl DocumentSource for DirectoryLoader {
    async fn load_documents(&self) -> crate::error::Result<Vec<Document>> {
        let files = self.collector.collect_directory(&self.root).map_err(|e| {
            DocQaError::ingestion(self.root.display().to_string(), format!("{:#}", e))
        })?;

        let mut documents = Vec::with_capacity(files.len());

        for file in &files {
            let source_id = self.source_id(&file.path);
            match self.extractor.extract(&file.path, file.file_type, &source_id).await {
                Ok(raw) => documents.push(raw.normalize()),
                Err(e) => tracing::warn!("Skipping {}: {}", source_id, e),
            }
        }

        tracing::info!(
            "Loaded {} documents ({} skipped)",
            documents.len(),
            files.len() - documents.len()
        );
        Ok(documents)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("txt"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("png"), None);
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[test]
    fn test_collect_directory_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("b.md"), "# B").unwrap();
        std::fs::write(root.join("nested/a.txt"), "A").unwrap();
        std::fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();

        let files = FileCollector::default().collect_directory(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("b.md"), PathBuf::from("nested/a.txt")]);
    }

    #[test]
    fn test_pdf_only() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes.md"), "x").unwrap();

        let collector = FileCollector::new(CollectorConfig {
            pdf_only: true,
            ..Default::default()
        });
        assert!(collector.collect_directory(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileCollector::default().collect_directory(&temp_dir.path().join("nope"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_loader_skips_unreadable_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("sky.txt"), "The sky is blue.").unwrap();
        std::fs::write(root.join("broken.pdf"), b"this is not a pdf").unwrap();
        std::fs::write(root.join("latin1.txt"), [0xffu8, 0xfe, 0x41]).unwrap();

        let documents = DirectoryLoader::new(root).load_documents().await.unwrap();
        assert_eq!(documents, vec![Document::new("sky.txt", "The sky is blue.")]);
    }

    #[tokio::test]
    async fn test_loader_from_config_respects_pdf_only() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("sky.txt"), "The sky is blue.").unwrap();

        let mut vars = std::collections::HashMap::new();
        vars.insert("DOCS_DIR".to_string(), temp_dir.path().display().to_string());
        let mut config = crate::config::Config::from_vars(&vars).unwrap().index;

        let documents = DirectoryLoader::from_config(&config).load_documents().await.unwrap();
        assert_eq!(documents.len(), 1);

        config.pdf_only = true;
        let documents = DirectoryLoader::from_config(&config).load_documents().await.unwrap();
        assert!(documents.is_empty());
    }
}
