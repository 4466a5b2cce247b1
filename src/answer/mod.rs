//! 답변 모듈 - 근거 기반 구조화 답변 조립
//!
//! 생성 백엔드의 출력은 신뢰하지 않습니다. 파싱에 실패하면 검색 결과만으로
//! 안전한 대체 레코드를 만들고, 성공하더라도 인용/위험/감독 필드를 항상 보정합니다.
//!
//! - `prompt`: 질문 + 번호 붙은 근거 인용 + 목표 스키마
//! - `normalize`: 느슨한 원시 출력 -> `AnswerRecord` 보정 규칙
//! - `rules`: 질문 키워드 기반 위험/완화책 규칙 테이블
//! - `extractive`: 생성 호출 없는 결정적 답변 (exact / concise)
//! - `assembler`: 위 단계를 묶는 조립기

mod assembler;
mod extractive;
mod normalize;
mod prompt;
mod rules;

use serde::{Deserialize, Serialize};

pub use assembler::AnswerAssembler;
pub use extractive::{answer_concise, answer_exact, cite_label};
pub use normalize::{
    fallback_answer, no_evidence_answer, normalize_answer, parse_raw_answer, short_name,
    OneOrMany, RawAnswer, RawCitation, RawPage,
};
pub use prompt::build_prompt;
pub use rules::{backfill_for, RiskBackfill, RiskRule, RISK_RULES};

// ============================================================================
// Types
// ============================================================================

/// 준수 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "Compliant")]
    Compliant,
    #[serde(rename = "Not Compliant")]
    NotCompliant,
    #[serde(rename = "Unclear")]
    Unclear,
}

impl ComplianceStatus {
    /// 모델 출력 문자열 해석 (대소문자/공백 무시, 모르는 값은 `Unclear`)
    pub fn parse(value: &str) -> Self {
        let lowered = value.trim().to_lowercase();
        match lowered.as_str() {
            "compliant" => Self::Compliant,
            "not compliant" | "non-compliant" | "noncompliant" | "not_compliant" => {
                Self::NotCompliant
            }
            _ => Self::Unclear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "Compliant",
            Self::NotCompliant => "Not Compliant",
            Self::Unclear => "Unclear",
        }
    }

    /// 사람 검토 필요 여부 - `Compliant`가 아니면 항상 필요
    pub fn requires_supervision(&self) -> bool {
        *self != Self::Compliant
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 인용
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub page: u32,
    pub quote: String,
}

/// 최종 구조화 답변
///
/// `human_supervision_required == (compliance_status != Compliant)` 항상 성립.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub compliance_status: ComplianceStatus,
    pub rationale: String,
    pub citations: Vec<Citation>,
    pub violations_or_risks: Vec<String>,
    pub alternative_suggestions: Vec<String>,
    pub summary_proposal: String,
    pub human_supervision_required: bool,
}

// ============================================================================
// Text helpers
// ============================================================================

/// 연속 공백을 하나로
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 문자 단위 자르기 (UTF-8 경계 안전)
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(ComplianceStatus::parse("Compliant"), ComplianceStatus::Compliant);
        assert_eq!(ComplianceStatus::parse(" compliant "), ComplianceStatus::Compliant);
        assert_eq!(
            ComplianceStatus::parse("Not Compliant"),
            ComplianceStatus::NotCompliant
        );
        assert_eq!(ComplianceStatus::parse("NON-COMPLIANT"), ComplianceStatus::NotCompliant);
        assert_eq!(ComplianceStatus::parse("Unclear"), ComplianceStatus::Unclear);
        assert_eq!(ComplianceStatus::parse("maybe?"), ComplianceStatus::Unclear);
        assert_eq!(ComplianceStatus::parse(""), ComplianceStatus::Unclear);
    }

    #[test]
    fn test_supervision_follows_status() {
        assert!(!ComplianceStatus::Compliant.requires_supervision());
        assert!(ComplianceStatus::NotCompliant.requires_supervision());
        assert!(ComplianceStatus::Unclear.requires_supervision());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ComplianceStatus::NotCompliant).unwrap(),
            "\"Not Compliant\""
        );
        let parsed: ComplianceStatus = serde_json::from_str("\"Unclear\"").unwrap();
        assert_eq!(parsed, ComplianceStatus::Unclear);
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(collapse_whitespace("  a \n b\t c "), "a b c");
        assert_eq!(truncate_chars("2–8 °C", 3), "2–8");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 10), "");
    }
}
