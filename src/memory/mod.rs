//! 대화 기록
//!
//! 프로세스 수명 동안 유지되는 추가 전용 턴 로그입니다.
//! 삭제/수정 API는 없으며, 길이 제한도 없습니다.

use serde::Serialize;

/// 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 대화 한 턴
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// 대화 메모리
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        tracing::debug!("Conversation memory now holds {} turns", self.turns.len());
    }

    /// 질문/답변 쌍 추가
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.append(ConversationTurn::user(question));
        self.append(ConversationTurn::assistant(answer));
    }

    /// 시간순 스냅샷 (이후 추가는 반영되지 않음)
    pub fn as_sequence(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
