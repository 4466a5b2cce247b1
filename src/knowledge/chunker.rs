//! Text Chunking Module
//!
//! 공백 기준 토큰 윈도우로 텍스트를 분할합니다.
//! 오버랩을 유지하며, 같은 입력과 파라미터에 대해 항상 같은 청크를 생성합니다.

use std::sync::OnceLock;

use regex::Regex;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 당 최대 토큰 수 (공백 구분)
    pub max_tokens: usize,
    /// 인접 청크 간 중첩 토큰 수
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::for_ingest()
    }
}

impl ChunkConfig {
    /// 수집 단계 설정 (420 / 60)
    pub fn for_ingest() -> Self {
        Self {
            max_tokens: 420,
            overlap: 60,
        }
    }

    /// 윈도우 이동 폭
    ///
    /// `overlap >= max_tokens`여도 최소 1 토큰씩 전진해야 종료가 보장됩니다.
    pub fn step(&self) -> usize {
        self.max_tokens.saturating_sub(self.overlap).max(1)
    }
}

// ============================================================================
// TokenWindows
// ============================================================================

/// 토큰 윈도우 이터레이터
///
/// `Clone`으로 복제하면 처음부터 다시 순회할 수 있습니다 (순수 함수형).
#[derive(Debug, Clone)]
pub struct TokenWindows<'a> {
    tokens: Vec<&'a str>,
    max_tokens: usize,
    step: usize,
    position: usize,
}

impl<'a> TokenWindows<'a> {
    pub fn new(text: &'a str, config: ChunkConfig) -> Self {
        Self {
            tokens: text.split_whitespace().collect(),
            max_tokens: config.max_tokens,
            step: config.step(),
            position: 0,
        }
    }

    /// 전체 토큰 수
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

impl Iterator for TokenWindows<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.max_tokens == 0 || self.position >= self.tokens.len() {
            return None;
        }

        let end = (self.position + self.max_tokens).min(self.tokens.len());
        let chunk = self.tokens[self.position..end].join(" ");
        self.position += self.step;

        Some(chunk)
    }
}

/// 텍스트를 청크로 분할
///
/// `max_tokens` 크기 윈도우를 `max(1, max_tokens - overlap)` 토큰씩 이동합니다.
/// 빈 입력은 빈 결과를 반환합니다.
pub fn split(text: &str, max_tokens: usize, overlap: usize) -> Vec<String> {
    TokenWindows::new(text, ChunkConfig { max_tokens, overlap }).collect()
}

// ============================================================================
// Clause Label
// ============================================================================

fn clause_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(Section|Clause|Subclause|Subsection)\s+\d+(\.\d+)*")
            .expect("Invalid clause regex")
    })
}

/// 규제 문서 스타일 조항 라벨 추출 (예: "Section 12.3")
///
/// 첫 번째 매치만 반환합니다.
pub fn guess_clause_label(text: &str) -> Option<String> {
    clause_pattern().find(text).map(|m| m.as_str().to_string())
}

// ============================================================================
// Page Chunking
// ============================================================================

/// 페이지 단위 청크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    /// "{page}-{i}"
    pub chunk_id: String,
    pub page: u32,
    pub text: String,
    pub clause: Option<String>,
}

/// 한 페이지를 청크로 분할하고 ID/조항 라벨을 부여
pub fn chunk_page(page: u32, text: &str, config: ChunkConfig) -> Vec<PageChunk> {
    TokenWindows::new(text, config)
        .enumerate()
        .map(|(i, chunk)| PageChunk {
            chunk_id: format!("{}-{}", page, i),
            page,
            clause: guess_clause_label(&chunk),
            text: chunk,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
