//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

/// "--- Page 3 ---" 형태의 페이지 구분 줄
fn page_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
            .expect("Invalid regex")
    })
}

/// PDF에서 텍스트 추출
///
/// 페이지별로 (페이지 번호, 텍스트) 튜플을 반환합니다. 페이지 번호는 1부터 시작합니다.
/// 텍스트가 없으면 (스캔 문서 등) 빈 벡터입니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    let pattern = page_marker();
    if pattern.is_match(text) {
        let pages: Vec<String> = pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[1], "Page 2 content");
    }

    #[test]
    fn test_split_pdf_pages_with_markers() {
        let text = "intro\n--- Page 2 ---\nsecond page";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["intro".to_string(), "second page".to_string()]);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let pages = split_pdf_pages("  Just some text without page breaks ");
        assert_eq!(pages, vec!["Just some text without page breaks".to_string()]);
    }

    #[test]
    fn test_missing_file() {
        assert!(extract_text_from_pdf(Path::new("/definitely/not/here.pdf")).is_err());
    }
}
