//! 근거 기반 답변 조립기

use std::sync::Arc;

use super::normalize::{fallback_answer, no_evidence_answer, normalize_answer, parse_raw_answer};
use super::prompt::build_prompt;
use super::AnswerRecord;
use crate::error::Result;
use crate::generation::{GenerationBackend, GenerationRequest};
use crate::knowledge::RetrievalResult;

/// 답변 조립기
///
/// 근거가 없으면 백엔드를 호출하지 않습니다. 생성 출력이 깨졌으면 대체 레코드로 복구하며,
/// 호출자에게 전파되는 오류는 백엔드 재시도 소진(`FatalBackend`)뿐입니다.
pub struct AnswerAssembler {
    backend: Arc<dyn GenerationBackend>,
}

impl AnswerAssembler {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// 검색 결과로 구조화 답변 생성
    pub async fn assemble(
        &self,
        question: &str,
        passages: &[RetrievalResult],
    ) -> Result<AnswerRecord> {
        if passages.is_empty() {
            tracing::info!("No evidence retrieved; returning deterministic Unclear answer");
            return Ok(no_evidence_answer(question));
        }

        let request = GenerationRequest::new(build_prompt(question, passages));
        let text = self.backend.generate(&request).await?;

        let raw = match parse_raw_answer(&text) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Generation output rejected ({}); using fallback answer", e);
                fallback_answer(&text, passages)
            }
        };

        Ok(normalize_answer(question, raw, passages))
    }
}
