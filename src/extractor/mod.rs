//! 콘텐츠 추출 모듈
//!
//! 다양한 소스에서 (페이지 번호, 텍스트) 목록을 추출합니다.
//! - PDF 파일: pdf-extract로 추출, 폼피드로 페이지 분리
//! - DOCX 파일: zip + quick-xml로 `word/document.xml` 본문 추출
//! - 텍스트/마크다운 파일: 직접 읽기
//! - HTML 파일 / URL: 상용구 요소 제거 후 본문만
//!
//! 수집 파이프라인은 `SourceReader` 트레이트에만 의존하므로 테스트에서는
//! 메모리 기반 리더로 교체할 수 있습니다.

pub mod docx;
pub mod pdf;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::collector::FileType;
use crate::error::{Result, RiaError};
use crate::knowledge::{DocumentSource, SourceKind};
use crate::scraper::{html_to_text, WebScraper};

// ============================================================================
// SourceReader Trait
// ============================================================================

/// 소스 리더 트레이트
///
/// 페이지 번호는 1부터 시작합니다. 실패는 `SourceRead`로 보고되며
/// 호출자는 해당 소스만 건너뜁니다.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn extract(&self, kind: SourceKind, locator: &str) -> Result<Vec<(u32, String)>>;

    /// 소스 단위 편의 함수
    async fn read_source(&self, source: &DocumentSource) -> Result<Vec<(u32, String)>> {
        self.extract(source.kind, &source.locator).await
    }
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 기본 콘텐츠 추출기 (파일 형식은 확장자로 판별)
pub struct ContentExtractor {
    scraper: WebScraper,
}

impl ContentExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            scraper: WebScraper::new()?,
        })
    }

    /// 파일에서 추출
    async fn extract_file(&self, path: &Path) -> Result<Vec<(u32, String)>> {
        let locator = path.to_string_lossy().into_owned();
        let file_type = FileType::from_path(path)
            .ok_or_else(|| RiaError::source_read(locator.as_str(), "unsupported file type"))?;

        match file_type {
            FileType::Pdf => {
                // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
                let path = path.to_path_buf();
                tokio::task::spawn_blocking(move || pdf::extract_pdf_pages(&path))
                    .await
                    .map_err(|e| RiaError::source_read(locator.as_str(), e))?
            }
            FileType::Docx => {
                let bytes = read_bytes(path, &locator).await?;
                let owned = locator.clone();
                let text = tokio::task::spawn_blocking(move || {
                    docx::extract_docx_text(&owned, &bytes)
                })
                .await
                .map_err(|e| RiaError::source_read(locator.as_str(), e))??;
                Ok(vec![(1, text)])
            }
            FileType::Text => {
                let text = read_text(path, &locator).await?;
                Ok(vec![(1, text)])
            }
            FileType::Html => {
                let html = read_text(path, &locator).await?;
                Ok(vec![(1, html_to_text(&html))])
            }
        }
    }

    /// URL에서 추출
    async fn extract_url(&self, url: &str) -> Result<Vec<(u32, String)>> {
        let scraped = self.scraper.scrape(url).await?;
        tracing::debug!(
            "Fetched {} ({})",
            url,
            scraped.title.as_deref().unwrap_or("untitled")
        );
        Ok(vec![(1, scraped.content)])
    }
}

async fn read_bytes(path: &Path, locator: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| RiaError::source_read(locator, e))
}

async fn read_text(path: &Path, locator: &str) -> Result<String> {
    let bytes = read_bytes(path, locator).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl SourceReader for ContentExtractor {
    async fn extract(&self, kind: SourceKind, locator: &str) -> Result<Vec<(u32, String)>> {
        match kind {
            SourceKind::File => self.extract_file(&PathBuf::from(locator)).await,
            SourceKind::Url => self.extract_url(locator).await,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_text_and_html_files() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("gmp.txt");
        let html = dir.path().join("page.html");
        std::fs::write(&txt, "Section 5 requires storage at 2-8 °C.").unwrap();
        std::fs::write(
            &html,
            "<html><body><nav>menu</nav><p>Clause 3 applies.</p></body></html>",
        )
        .unwrap();

        let extractor = ContentExtractor::new().unwrap();

        let pages = extractor
            .extract(SourceKind::File, txt.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(pages, vec![(1, "Section 5 requires storage at 2-8 °C.".to_string())]);

        let pages = extractor
            .read_source(&DocumentSource::file("page.html", html.to_string_lossy()))
            .await
            .unwrap();
        assert_eq!(pages, vec![(1, "Clause 3 applies.".to_string())]);
    }

    #[tokio::test]
    async fn test_unreadable_sources_are_source_errors() {
        let dir = TempDir::new().unwrap();
        let extractor = ContentExtractor::new().unwrap();

        let missing = dir.path().join("missing.txt");
        let err = extractor
            .extract(SourceKind::File, missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SourceRead);

        let unsupported = dir.path().join("data.bin");
        std::fs::write(&unsupported, [0u8, 1, 2]).unwrap();
        let err = extractor
            .extract(SourceKind::File, unsupported.to_str().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SourceRead);
    }
}
