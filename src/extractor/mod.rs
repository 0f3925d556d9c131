//! 콘텐츠 추출 모듈
//!
//! 파일 형식별로 텍스트를 추출해 [`RawDocument`]를 만듭니다.
//! - 텍스트/마크다운: UTF-8로 직접 읽기
//! - PDF: pdf-extract로 페이지별 추출

pub mod pdf;

use std::path::Path;

use crate::collector::FileType;
use crate::error::{DocQaError, Result};
use crate::knowledge::RawDocument;

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 콘텐츠 추출
    ///
    /// 읽을 수 없거나 텍스트가 없는 파일은 `Ingestion` 에러입니다.
    pub async fn extract(
        &self,
        path: &Path,
        file_type: FileType,
        source_id: &str,
    ) -> Result<RawDocument> {
        let segments = match file_type {
            FileType::Text => self.extract_text(path, source_id).await?,
            FileType::Pdf => self.extract_pdf(path, source_id).await?,
        };

        if segments.iter().all(|s| s.trim().is_empty()) {
            return Err(DocQaError::ingestion(source_id, "no extractable text"));
        }

        Ok(RawDocument::new(source_id, segments))
    }

    async fn extract_text(&self, path: &Path, source_id: &str) -> Result<Vec<String>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DocQaError::ingestion(source_id, format!("failed to read: {}", e)))?;

        let text = String::from_utf8(bytes)
            .map_err(|_| DocQaError::ingestion(source_id, "file is not valid UTF-8 text"))?;

        Ok(vec![text])
    }

    async fn extract_pdf(&self, path: &Path, source_id: &str) -> Result<Vec<String>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
            .await
            .map_err(|e| DocQaError::ingestion(source_id, format!("PDF extraction task failed: {}", e)))?
            .map_err(|e| DocQaError::ingestion(source_id, format!("{:#}", e)))?;

        tracing::debug!("Extracted {} pages from {}", pages.len(), source_id);
        Ok(pages.into_iter().map(|(_, text)| text).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_text_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nBody").unwrap();

        let raw = ContentExtractor::new()
            .extract(&path, FileType::Text, "notes.md")
            .await
            .unwrap();
        assert_eq!(raw.source_id, "notes.md");
        assert_eq!(raw.normalize().text, "# Title\n\nBody");
    }

    #[tokio::test]
    async fn test_empty_file_is_ingestion_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.txt");
        std::fs::write(&path, "   \n").unwrap();

        let err = ContentExtractor::new()
            .extract(&path, FileType::Text, "empty.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::Ingestion { .. }));
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_ingestion_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fake.pdf");
        std::fs::write(&path, b"plain bytes").unwrap();

        let err = ContentExtractor::new()
            .extract(&path, FileType::Pdf, "fake.pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fake.pdf"));
    }
}
