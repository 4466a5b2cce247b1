//! 생성 프롬프트 구성

use crate::knowledge::RetrievalResult;

const RULES: &str = "You are a Regulatory Impact Assessment assistant.
Answer strictly using ONLY the quoted passages.
Include citations as [Document (page X)]. If unclear, say so and require human supervision.
Return a JSON object in the exact schema shown.";

const SCHEMA: &str = r#"Your response MUST be a single JSON object matching this schema and constraints:
{
  "compliance_status": "Compliant" | "Not Compliant" | "Unclear",
  "rationale": "1–3 sentences grounded ONLY in the quotes",
  "citations": [
    {"source": "filename.pdf", "page": <int>, "quote": "verbatim clause"}
  ],
  "violations_or_risks": [
    "At least 1 specific risk or violated clause; if unclear, state the most likely risk."
  ],
  "alternative_suggestions": [
    "At least 1 concrete mitigation (e.g., validated 2–8 °C shipper, temp logger)."
  ],
  "summary_proposal": "Short summary referencing cited clauses.",
  "human_supervision_required": true
}

Rules:
- Do NOT invent citations; every assertion must be backed by the provided quotes.
- If the user asks to LIST requirements (e.g., "what must/include/requirements"), DO NOT assess current compliance.
  In that case: set "compliance_status" to "Compliant" to indicate the requirement extraction is complete,
  provide the requirements and citations.
- If evidence is insufficient, set "Unclear" BUT STILL provide at least one plausible risk and one mitigation suggestion.
- Keep quotes short (1–3 lines) and include the page numbers."#;

/// 질문, 번호 붙은 근거 인용(출처 + 페이지), 목표 스키마로 프롬프트 구성
pub fn build_prompt(question: &str, passages: &[RetrievalResult]) -> String {
    let quotes: Vec<String> = passages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "[{}] {} (page {})\n\"\"\"\n{}\n\"\"\"\n",
                i + 1,
                p.chunk.source,
                p.chunk.page,
                p.chunk.text
            )
        })
        .collect();

    format!(
        "{}\n\nQuestion:\n{}\n\nEvidence passages:\n{}\n\n{}\n",
        RULES,
        question.trim(),
        quotes.join("\n"),
        SCHEMA
    )
}
