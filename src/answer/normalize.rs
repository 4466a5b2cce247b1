//! 생성 출력 해석 및 보정
//!
//! 원시 출력은 느슨한 타입(`RawAnswer`)으로 받고, `normalize_answer`가
//! 아래 규칙을 순서대로 적용해 `AnswerRecord`를 만듭니다.
//!
//! 1. 판정: 알 수 없거나 없으면 `Unclear`
//! 2. 인용이 비었으면 상위 3개 구절에서 기계적으로 생성
//! 3. 인용 출처가 비었거나 자리표시자("doc")면 첫 구절의 출처, 페이지가 없거나 0이면 첫 구절의 페이지
//! 4. 인용문은 공백 정리 후 400자로 자름
//! 5. 위험/완화책이 비었으면 규칙 테이블로 채움
//! 6. 사람 검토 여부는 판정으로부터 다시 계산 (모델 값 무시)

use serde::Deserialize;

use super::rules::{backfill_for, RISK_RULES};
use super::{collapse_whitespace, truncate_chars, AnswerRecord, Citation, ComplianceStatus};
use crate::error::{Result, RiaError};
use crate::knowledge::RetrievalResult;

/// 모델 인용문 최대 길이
const QUOTE_MAX_CHARS: usize = 400;
/// 기계적으로 만든 인용문 최대 길이
const DERIVED_QUOTE_MAX_CHARS: usize = 300;
/// 대체 레코드 rationale 최대 길이
const FALLBACK_RATIONALE_MAX_CHARS: usize = 600;
/// 인용이 비었을 때 사용할 구절 수
const BACKFILL_CITATIONS: usize = 3;
/// 파싱 실패 시 사용할 구절 수
const FALLBACK_CITATIONS: usize = 4;

const PLACEHOLDER_SOURCES: &[&str] = &["", "doc"];
const FALLBACK_SUMMARY: &str = "See grounded excerpts and consult a human reviewer.";

// ============================================================================
// Raw (untrusted) types
// ============================================================================

/// 문자열 하나 또는 목록
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// 정수, 실수(`3.0`) 또는 숫자 문자열 페이지
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPage {
    Number(i64),
    Float(f64),
    Text(String),
}

impl RawPage {
    fn as_page(&self) -> Option<u32> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Float(f) => whole_number(*f)?,
            Self::Text(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(n) => n,
                    Err(_) => whole_number(s.parse().ok()?)?,
                }
            }
        };
        u32::try_from(value).ok().filter(|&p| p > 0)
    }
}

/// 소수부가 없는 유한 실수만 정수로 인정
fn whole_number(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() <= u32::MAX as f64)
        .then_some(value as i64)
}

/// 모델이 돌려준 인용
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCitation {
    pub source: Option<String>,
    pub page: Option<RawPage>,
    pub quote: Option<String>,
}

/// 모델이 돌려준 답변 (모든 필드 선택)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAnswer {
    pub compliance_status: Option<String>,
    pub rationale: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub citations: Vec<RawCitation>,
    pub violations_or_risks: Option<OneOrMany>,
    pub alternative_suggestions: Option<OneOrMany>,
    pub summary_proposal: Option<String>,
    /// 판정으로부터 다시 계산하므로 어떤 형태든 받아 둠
    pub human_supervision_required: Option<serde_json::Value>,
}

/// `null` 인용 목록은 빈 목록으로
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<RawCitation>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<RawCitation>>::deserialize(deserializer)?.unwrap_or_default())
}

/// 모델이 주장한 사람 검토 여부 (`true` 또는 `"true"`)
fn claimed_flag(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => s.trim().to_ascii_lowercase().parse().ok(),
        _ => None,
    }
}

/// 생성 출력 파싱
///
/// 마크다운 코드 펜스로 감싼 출력도 허용합니다. JSON 객체가 아니면 `MalformedOutput`.
pub fn parse_raw_answer(text: &str) -> Result<RawAnswer> {
    let body = strip_code_fence(text);

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| RiaError::MalformedOutput(format!("not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(RiaError::MalformedOutput(
            "expected a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| RiaError::MalformedOutput(format!("unexpected field shape: {}", e)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ============================================================================
// Helpers
// ============================================================================

/// 경로/URL의 마지막 구성요소
pub fn short_name(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn derived_citations(passages: &[RetrievalResult], count: usize) -> Vec<Citation> {
    passages
        .iter()
        .take(count)
        .map(|p| Citation {
            source: short_name(&p.chunk.source),
            page: p.chunk.page,
            quote: truncate_chars(&collapse_whitespace(&p.chunk.text), DERIVED_QUOTE_MAX_CHARS),
        })
        .collect()
}

fn non_blank(items: Option<OneOrMany>) -> Vec<String> {
    items
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Records
// ============================================================================

/// 근거가 없을 때의 결정적 레코드 (생성 호출 없음)
pub fn no_evidence_answer(question: &str) -> AnswerRecord {
    let fill = backfill_for(question, RISK_RULES);
    AnswerRecord {
        compliance_status: ComplianceStatus::Unclear,
        rationale: "No index or no matches. Ingest documents first.".to_string(),
        citations: Vec::new(),
        violations_or_risks: fill.risks,
        alternative_suggestions: fill.mitigations,
        summary_proposal: "Ingest relevant documents and retry; see suggested mitigations."
            .to_string(),
        human_supervision_required: true,
    }
}

/// 파싱 실패 시 대체 원시 답변
///
/// rationale은 원문 앞부분, 인용은 상위 구절에서 생성합니다.
pub fn fallback_answer(raw_text: &str, passages: &[RetrievalResult]) -> RawAnswer {
    RawAnswer {
        compliance_status: Some(ComplianceStatus::Unclear.as_str().to_string()),
        rationale: Some(truncate_chars(raw_text, FALLBACK_RATIONALE_MAX_CHARS)),
        citations: derived_citations(passages, FALLBACK_CITATIONS)
            .into_iter()
            .map(|c| RawCitation {
                source: Some(c.source),
                page: Some(RawPage::Number(i64::from(c.page))),
                quote: Some(c.quote),
            })
            .collect(),
        violations_or_risks: None,
        alternative_suggestions: None,
        summary_proposal: Some(FALLBACK_SUMMARY.to_string()),
        human_supervision_required: Some(serde_json::Value::Bool(true)),
    }
}

/// 원시 답변에 보정 규칙 적용
pub fn normalize_answer(
    question: &str,
    raw: RawAnswer,
    passages: &[RetrievalResult],
) -> AnswerRecord {
    let status = raw
        .compliance_status
        .as_deref()
        .map(ComplianceStatus::parse)
        .unwrap_or(ComplianceStatus::Unclear);

    let (first_source, first_page) = passages
        .first()
        .map(|p| (short_name(&p.chunk.source), p.chunk.page))
        .unwrap_or_else(|| (String::new(), 1));

    let citations = if raw.citations.is_empty() {
        derived_citations(passages, BACKFILL_CITATIONS)
    } else {
        raw.citations
            .into_iter()
            .map(|c| {
                let source = c
                    .source
                    .map(|s| short_name(&s))
                    .filter(|s| !PLACEHOLDER_SOURCES.contains(&s.as_str()))
                    .unwrap_or_else(|| first_source.clone());
                let page = c.page.as_ref().and_then(RawPage::as_page).unwrap_or(first_page);
                let quote = c
                    .quote
                    .map(|q| truncate_chars(&collapse_whitespace(&q), QUOTE_MAX_CHARS))
                    .unwrap_or_default();
                Citation {
                    source,
                    page,
                    quote,
                }
            })
            .collect()
    };

    let mut risks = non_blank(raw.violations_or_risks);
    let mut mitigations = non_blank(raw.alternative_suggestions);
    if risks.is_empty() || mitigations.is_empty() {
        let fill = backfill_for(question, RISK_RULES);
        if risks.is_empty() {
            risks = fill.risks;
        }
        if mitigations.is_empty() {
            mitigations = fill.mitigations;
        }
    }

    if let Some(claimed) = raw.human_supervision_required.as_ref().and_then(claimed_flag) {
        if claimed != status.requires_supervision() {
            tracing::debug!(
                "Overriding model supervision flag ({}) for status {}",
                claimed,
                status
            );
        }
    }

    AnswerRecord {
        compliance_status: status,
        rationale: raw.rationale.map(|r| r.trim().to_string()).unwrap_or_default(),
        citations,
        violations_or_risks: risks,
        alternative_suggestions: mitigations,
        summary_proposal: raw
            .summary_proposal
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_SUMMARY.to_string()),
        human_supervision_required: status.requires_supervision(),
    }
}

// ============================================================================
// Tests
// ============================================================================
