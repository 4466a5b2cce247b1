//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;

use crate::error::{Result, RiaError};

/// PDF에서 페이지별 텍스트 추출
///
/// 폼피드(`\x0c`) 기준으로 나눈 (페이지 번호, 텍스트) 목록을 반환합니다.
/// 페이지 번호는 1부터 시작하며, 빈 페이지도 번호를 유지합니다.
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let locator = path.to_string_lossy();
    let bytes = std::fs::read(path).map_err(|e| RiaError::source_read(locator.as_ref(), e))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| RiaError::source_read(locator.as_ref(), e))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(split_pdf_pages(&text))
}

/// 폼피드 기준 페이지 분리
fn split_pdf_pages(text: &str) -> Vec<(u32, String)> {
    let mut pages: Vec<String> = text.split('\x0c').map(|s| s.trim().to_string()).collect();

    // 마지막 폼피드 뒤의 빈 조각은 페이지가 아님
    while pages.len() > 1 && pages.last().map(String::is_empty).unwrap_or(false) {
        pages.pop();
    }

    pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| (i as u32 + 1, page))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
