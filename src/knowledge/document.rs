//! 문서/청크 타입
//!
//! 추출기가 만든 [`RawDocument`]는 수집 경계에서 한 번만 정규화되어
//! [`Document`]가 됩니다. 이후 단계는 평문 텍스트만 다룹니다.

use serde::{Deserialize, Serialize};

/// 추출 직후의 문서 (PDF 페이지 등 세그먼트 단위)
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub source_id: String,
    pub segments: Vec<String>,
}

impl RawDocument {
    pub fn new(source_id: impl Into<String>, segments: Vec<String>) -> Self {
        Self {
            source_id: source_id.into(),
            segments,
        }
    }

    /// 세그먼트를 원래 순서대로 개행으로 이어붙여 정규화
    pub fn normalize(self) -> Document {
        Document {
            source_id: self.source_id,
            text: self.segments.join("\n"),
        }
    }
}

/// 정규화된 문서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_id: String,
    pub text: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// 검색 단위 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 원본 문서의 source_id
    pub document_id: String,
    /// 문서 내 순번 (0-based)
    pub sequence: usize,
    pub text: String,
}
