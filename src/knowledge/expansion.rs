//! Query Expansion - 키워드 기반 동의어 확장
//!
//! 고정 규칙 테이블에서 트리거 키워드가 질의에 포함되면
//! 해당 동의어를 질의 뒤에 덧붙입니다. 추가 항목 수는 상한이 있습니다.

/// 확장 규칙
#[derive(Debug, Clone, Copy)]
pub struct ExpansionRule {
    /// 소문자 부분 문자열 트리거
    pub triggers: &'static [&'static str],
    pub synonyms: &'static [&'static str],
}

/// 추가되는 동의어 최대 개수
pub const MAX_EXPANSION_TERMS: usize = 12;

/// 콜드체인 / 보관 온도
const TEMPERATURE_RULE: ExpansionRule = ExpansionRule {
    triggers: &[
        "2–8", "2-8", "2 to 8", "refriger", "cold chain", "transport", "shipping", "storage",
        "stored", "temperature",
    ],
    synonyms: &[
        "2–8 °C",
        "2 - 8 °C",
        "2 to 8 °C",
        "2-8 °C",
        "2-8C",
        "refrigerated",
        "cold chain",
        "controlled temperature",
        "storage and transportation",
        "transport",
        "shipping",
        "Section 24",
        "TGO 109",
    ],
};

/// 말라리아 / 풍토 지역
const MALARIA_RULE: ExpansionRule = ExpansionRule {
    triggers: &["malaria", "endemic"],
    synonyms: &[
        "malaria",
        "malaria-endemic",
        "endemic region",
        "ineligib",
        "deferr",
        "period of ineligibility",
    ],
};

/// 헌혈 유예 / 적격성
const DEFERRAL_RULE: ExpansionRule = ExpansionRule {
    triggers: &["deferr", "ineligib", "exclusion", "eligib"],
    synonyms: &[
        "deferral",
        "period of ineligibility",
        "ineligible",
        "donor eligibility",
        "exclusion",
        "contraindicated",
    ],
};

/// 기본 규칙 테이블
pub const EXPANSION_RULES: &[ExpansionRule] = &[TEMPERATURE_RULE, MALARIA_RULE, DEFERRAL_RULE];

/// 매칭된 동의어 목록 (중복 제거, 순서 유지, 상한 적용)
pub fn expansion_terms(query: &str, rules: &[ExpansionRule]) -> Vec<&'static str> {
    let lowered = query.to_lowercase();
    let mut terms: Vec<&'static str> = Vec::new();

    for rule in rules {
        if rule.triggers.iter().any(|t| lowered.contains(t)) {
            for synonym in rule.synonyms {
                if !terms.contains(synonym) {
                    terms.push(synonym);
                }
            }
        }
    }

    terms.truncate(MAX_EXPANSION_TERMS);
    terms
}

/// 질의 확장 (매칭 없으면 원문 그대로)
pub fn expand_query(query: &str) -> String {
    let terms = expansion_terms(query, EXPANSION_RULES);
    if terms.is_empty() {
        return query.to_string();
    }
    format!("{} {}", query, terms.join(" "))
}

// ============================================================================
// Tests
// ============================================================================
