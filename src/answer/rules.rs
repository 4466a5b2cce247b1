//! 위험/완화책 보정 규칙 테이블
//!
//! 모델이 위험이나 완화책을 비워 두었거나 근거가 없을 때 질문 키워드로 채웁니다.
//! 어떤 규칙도 맞지 않으면 일반 문구를 사용하므로 결과 목록은 절대 비지 않습니다.

/// 규칙 하나
#[derive(Debug, Clone, Copy)]
pub struct RiskRule {
    /// 소문자 부분 문자열 트리거
    pub triggers: &'static [&'static str],
    pub risks: &'static [&'static str],
    pub mitigations: &'static [&'static str],
}

const COLD_CHAIN_RULE: RiskRule = RiskRule {
    triggers: &["2–8", "2-8", "2 to 8", "refriger", "cold chain", "transport", "shipping"],
    risks: &[
        "Risk of temperature excursion during transport leading to product quality compromise.",
        "Potential non-compliance with storage/transport clauses if 2–8 °C cannot be maintained for full transit.",
    ],
    mitigations: &[
        "Use a validated 2–8 °C shipper with lane qualification and pre-conditioned gel packs.",
        "Include a calibrated temperature logger and define acceptance criteria; review on receipt.",
        "Reduce transit time or split shipments; ensure monitored handover at each leg.",
    ],
};

const MALARIA_RULE: RiskRule = RiskRule {
    triggers: &["malaria", "endemic"],
    risks: &["Risk of transfusion-transmitted malaria if deferral/eligibility rules are not applied."],
    mitigations: &[
        "Apply the specified deferral period or require negative testing per the cited appendix before acceptance.",
    ],
};

const DEFERRAL_RULE: RiskRule = RiskRule {
    triggers: &["deferr", "ineligib"],
    risks: &["Risk of accepting an ineligible donor if the cited deferral period is not applied."],
    mitigations: &[
        "Check donor history against the cited deferral criteria before acceptance and record the outcome.",
    ],
};

/// 기본 규칙 테이블
pub const RISK_RULES: &[RiskRule] = &[COLD_CHAIN_RULE, MALARIA_RULE, DEFERRAL_RULE];

const GENERIC_RISK: &str =
    "Evidence insufficient; risk of non-compliance if policy deviates from cited clauses.";
const GENERIC_MITIGATION: &str =
    "Escalate for human review and obtain written confirmation against the cited standard/appendix.";

/// 보정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskBackfill {
    pub risks: Vec<String>,
    pub mitigations: Vec<String>,
}

/// 질문에 맞는 위험/완화책 (둘 다 최소 1개)
pub fn backfill_for(question: &str, rules: &[RiskRule]) -> RiskBackfill {
    let lowered = question.to_lowercase();
    let mut risks: Vec<String> = Vec::new();
    let mut mitigations: Vec<String> = Vec::new();

    for rule in rules {
        if !rule.triggers.iter().any(|t| lowered.contains(t)) {
            continue;
        }
        risks.extend(rule.risks.iter().map(|s| s.to_string()));
        mitigations.extend(rule.mitigations.iter().map(|s| s.to_string()));
    }

    if risks.is_empty() {
        risks.push(GENERIC_RISK.to_string());
    }
    if mitigations.is_empty() {
        mitigations.push(GENERIC_MITIGATION.to_string());
    }

    RiskBackfill { risks, mitigations }
}
