//! 결정적 답변 모드 (생성 호출 없음)
//!
//! - `answer_exact`: 검색된 조항을 인용 라벨과 함께 그대로 나열
//! - `answer_concise`: 첫 구절의 표현으로 판정을 추정하고 짧게 요약

use super::collapse_whitespace;
use super::normalize::short_name;
use super::truncate_chars;
use crate::knowledge::RetrievalResult;

const EXACT_SNIPPET_CHARS: usize = 360;
const EXACT_MAX_BULLETS: usize = 8;
const CONCISE_SNIPPET_CHARS: usize = 180;
const CONCISE_PASSAGES: usize = 4;
const CONCISE_SNIPPETS: usize = 2;

const NEGATIVE_CUES: &[&str] = &["must not", "not permitted", "ineligible", "contraindicated"];
const OBLIGATION_CUES: &[&str] = &["must ", "required", "shall "];

/// 인용 라벨: `name (clause, p.N)` 또는 `name (p.N)`
pub fn cite_label(passage: &RetrievalResult) -> String {
    let chunk = &passage.chunk;
    let base = short_name(&chunk.source).replace(".pdf", "");
    match chunk.clause.as_deref() {
        Some(clause) => format!("{} ({}, p.{})", base, clause, chunk.page),
        None => format!("{} (p.{})", base, chunk.page),
    }
}

/// 공백 정리 후 말줄임
fn shorten(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut = truncate_chars(&collapsed, max_chars);
    format!("{} …", cut.trim_end_matches([' ', ',', ';', ':', '.']))
}

/// 조항 원문 목록
pub fn answer_exact(passages: &[RetrievalResult]) -> String {
    if passages.is_empty() {
        return "No matching clauses found. Refine the question or ingest more docs. \
                [Human supervision required]"
            .to_string();
    }

    let mut seen: Vec<(String, String)> = Vec::new();
    let mut bullets: Vec<String> = Vec::new();

    for passage in passages {
        let text = shorten(&passage.chunk.text, EXACT_SNIPPET_CHARS);
        let cite = cite_label(passage);
        let key = (text, cite);
        if seen.contains(&key) {
            continue;
        }
        bullets.push(format!("• {}  [{}]", key.0, key.1));
        seen.push(key);
    }
    bullets.truncate(EXACT_MAX_BULLETS);

    format!(
        "Exact clauses & citations (review before use):\n\n{}\n\nHuman supervision required.",
        bullets.join("\n")
    )
}

/// 짧은 판정 + 요약
pub fn answer_concise(passages: &[RetrievalResult]) -> String {
    let Some(first) = passages.first() else {
        return "Unclear: no matching clauses found in the local index. \
                Refine the question or ingest more docs. [Human review required]"
            .to_string();
    };

    let mut snippets: Vec<String> = Vec::new();
    let mut cites: Vec<String> = Vec::new();

    for passage in passages.iter().take(CONCISE_PASSAGES) {
        let collapsed = collapse_whitespace(&passage.chunk.text);
        let snippet = format!(
            "{}.",
            truncate_chars(&collapsed, CONCISE_SNIPPET_CHARS).trim_end_matches([' ', ',', ';', ':'])
        );
        if !snippets.contains(&snippet) {
            snippets.push(snippet);
        }

        let cite = cite_label(passage);
        if !cites.contains(&cite) {
            cites.push(cite);
        }
    }
    snippets.truncate(CONCISE_SNIPPETS);

    let lead = collapse_whitespace(&first.chunk.text.to_lowercase());
    let verdict = if NEGATIVE_CUES.iter().any(|k| lead.contains(k)) {
        "Not compliant (likely)"
    } else if OBLIGATION_CUES.iter().any(|k| lead.contains(k)) {
        "Possibly compliant (depends on specifics)"
    } else {
        "Unclear"
    };

    format!(
        "{}: {} [Citations: {}]. Human supervision required.",
        verdict,
        snippets.join(" "),
        cites.join("; ")
    )
}
