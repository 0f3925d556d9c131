//! 생성된 SQL 정리와 검증
//!
//! 실행 전에 다음을 확인합니다.
//! - 단일 문장
//! - 읽기 전용 (`SELECT` / `WITH`로 시작, 쓰기 키워드 없음)
//! - `FROM` / `JOIN` 뒤의 모든 테이블이 허용 목록에 있음 (CTE 이름 제외)

use crate::error::{DocQaError, Result};

/// 읽기 전용 쿼리에 나올 수 없는 키워드
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "REINDEX", "TRUNCATE", "GRANT",
];

/// FROM 절을 끝내는 키워드
const CLAUSE_END_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "LIMIT", "HAVING", "UNION", "INTERSECT", "EXCEPT", "WINDOW",
    "OFFSET",
];

// ============================================================================
// Cleaning
// ============================================================================

/// 모델 출력에서 SQL만 추출
///
/// 코드 펜스, `SQLQuery:` 접두어, 뒤따르는 `SQLResult:` 블록, 끝의 `;`를 제거합니다.
pub fn clean_sql(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(pos) = text.rfind("SQLQuery:") {
        text = &text[pos + "SQLQuery:".len()..];
    }
    if let Some(pos) = text.find("SQLResult:") {
        text = &text[..pos];
    }

    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // 언어 태그 (```sql) 건너뛰기
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        if let Some(pos) = text.rfind("```") {
            text = &text[..pos];
        }
    }

    text.trim().trim_end_matches(';').trim().to_string()
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// 식별자/키워드 (quoted이면 따옴표 제거된 값)
    Word { text: String, quoted: bool },
    /// 문자열/숫자 리터럴
    Literal,
    Punct(char),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word { text, quoted: false } if text.eq_ignore_ascii_case(keyword))
    }

    fn word(&self) -> Option<&str> {
        match self {
            Token::Word { text, .. } => Some(text),
            _ => None,
        }
    }
}

fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else if c == '\'' {
            i = skip_quoted(&chars, i, '\'')?.1;
            tokens.push(Token::Literal);
        } else if c == '"' || c == '`' || c == '[' {
            let close = if c == '[' { ']' } else { c };
            let (text, next) = skip_quoted(&chars, i, close)?;
            i = next;
            tokens.push(Token::Word { text, quoted: true });
        } else if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if c.is_ascii_digit() {
                tokens.push(Token::Literal);
            } else {
                tokens.push(Token::Word { text, quoted: false });
            }
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }

    Ok(tokens)
}

/// `open` 위치의 따옴표 구간을 읽고 (내용, 다음 위치) 반환. 닫는 문자 두 번은 이스케이프.
fn skip_quoted(chars: &[char], open: usize, close: char) -> Result<(String, usize)> {
    let mut text = String::new();
    let mut i = open + 1;

    while i < chars.len() {
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) && close != ']' {
                text.push(close);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }

    Err(DocQaError::generation("generated SQL has an unterminated quote"))
}

// ============================================================================
// Validation
// ============================================================================

/// 허용 목록 기준 SQL 검증
pub fn validate_sql(sql: &str, allowed_tables: &[String]) -> Result<()> {
    let tokens = tokenize(sql)?;

    if tokens.is_empty() {
        return Err(DocQaError::generation("model did not produce a SQL query"));
    }

    if let Some(pos) = tokens.iter().position(|t| *t == Token::Punct(';')) {
        if pos + 1 < tokens.len() {
            return Err(DocQaError::generation(
                "generated SQL contains more than one statement",
            ));
        }
    }

    if !(tokens[0].is_keyword("SELECT") || tokens[0].is_keyword("WITH")) {
        return Err(DocQaError::generation(format!(
            "generated SQL is not a read-only query: {}",
            sql
        )));
    }

    if let Some(keyword) = WRITE_KEYWORDS
        .iter()
        .find(|k| tokens.iter().any(|t| t.is_keyword(k)))
    {
        return Err(DocQaError::generation(format!(
            "generated SQL contains forbidden keyword {}",
            keyword
        )));
    }

    let ctes = cte_names(&tokens);
    let mut rejected: Vec<String> = referenced_tables(&tokens)
        .into_iter()
        .filter(|table| {
            !ctes.iter().any(|c| c.eq_ignore_ascii_case(table))
                && !allowed_tables.iter().any(|a| a.eq_ignore_ascii_case(table))
        })
        .collect();

    if !rejected.is_empty() {
        rejected.dedup();
        return Err(DocQaError::generation(format!(
            "generated SQL references tables outside the allow-list: {} (allowed: {})",
            rejected.join(", "),
            allowed_tables.join(", ")
        )));
    }

    Ok(())
}

/// `name AS (` 또는 `name(cols) AS (` 형태의 CTE 이름
fn cte_names(tokens: &[Token]) -> Vec<String> {
    let mut names = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let Some(name) = token.word() else { continue };
        let mut j = i + 1;

        if tokens.get(j) == Some(&Token::Punct('(')) {
            while j < tokens.len() && tokens[j] != Token::Punct(')') {
                j += 1;
            }
            j += 1;
        }

        if tokens.get(j).is_some_and(|t| t.is_keyword("AS"))
            && tokens.get(j + 1) == Some(&Token::Punct('('))
        {
            names.push(name.to_string());
        }
    }

    names
}

/// `FROM` 절의 테이블 이름 (스키마 접두어 제거)
///
/// `FROM`, `JOIN`, 그리고 같은 괄호 깊이의 `,` 뒤에 오는 식별자를 모두
/// 테이블로 봅니다. `ON`/`USING` 조건 뒤의 쉼표 항목도 포함됩니다.
fn referenced_tables(tokens: &[Token]) -> Vec<String> {
    let mut tables = Vec::new();
    // 열려 있는 FROM 절들의 괄호 깊이
    let mut clauses: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut expect_table = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        i += 1;

        match token {
            Token::Punct('(') => {
                depth += 1;
                expect_table = false;
            }
            Token::Punct(')') => {
                while clauses.last() == Some(&depth) {
                    clauses.pop();
                }
                depth = depth.saturating_sub(1);
                expect_table = false;
            }
            Token::Punct(',') => {
                expect_table = clauses.last() == Some(&depth);
            }
            Token::Punct(_) | Token::Literal => {
                expect_table = false;
            }
            Token::Word { .. } if token.is_keyword("FROM") || token.is_keyword("JOIN") => {
                if clauses.last() != Some(&depth) {
                    clauses.push(depth);
                }
                expect_table = true;
            }
            Token::Word { .. } if CLAUSE_END_KEYWORDS.iter().any(|k| token.is_keyword(k)) => {
                if clauses.last() == Some(&depth) {
                    clauses.pop();
                }
                expect_table = false;
            }
            Token::Word { text, .. } if expect_table => {
                let mut name = text.clone();

                // schema.table
                while tokens.get(i) == Some(&Token::Punct('.')) {
                    match tokens.get(i + 1).and_then(|t| t.word()) {
                        Some(part) => {
                            name = part.to_string();
                            i += 2;
                        }
                        None => break,
                    }
                }
                tables.push(name);
                expect_table = false;
            }
            Token::Word { .. } => {}
        }
    }

    tables
}

// ============================================================================
// Tests
// ============================================================================
