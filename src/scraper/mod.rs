//! 웹 스크래퍼 모듈 - URL / HTML 본문 텍스트 추출
//!
//! 규정 문서 페이지에서 본문만 남기기 위해 `script`, `style`, `nav`, `header`, `footer`
//! 하위 텍스트는 버리고 공백을 정리합니다. 페이지 구분이 없으므로 항상 1페이지입니다.

use std::time::Duration;

use scraper::{Html, Selector};

use crate::error::{Result, RiaError};

/// 본문에서 제외할 요소
const EXCLUDED_ELEMENTS: &[&str] = &["script", "style", "nav", "header", "footer"];

/// URL 요청 타임아웃
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// 스크랩된 콘텐츠
#[derive(Debug, Clone)]
pub struct ScrapedContent {
    /// 페이지 제목
    pub title: Option<String>,
    /// 본문 텍스트 (HTML 태그 제거됨)
    pub content: String,
    /// 원본 URL
    pub url: String,
}

/// HTML 문서를 본문 텍스트로 변환
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    extract_content(&document)
}

fn extract_content(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let excluded = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| EXCLUDED_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        if excluded {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    // 연속 공백 정리
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 제목 추출 (`<title>`, 없으면 첫 `<h1>`)
fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        let element = document.select(&selector).next()?;
        let title = element.text().collect::<String>().trim().to_string();
        (!title.is_empty()).then_some(title)
    })
}

/// 웹 스크래퍼
pub struct WebScraper {
    client: reqwest::Client,
}

impl WebScraper {
    /// 새 스크래퍼 생성
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ria-assist/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| RiaError::InvalidInput(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self { client })
    }

    /// URL에서 콘텐츠 추출
    pub async fn scrape(&self, url: &str) -> Result<ScrapedContent> {
        tracing::info!("Scraping: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RiaError::source_read(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RiaError::source_read(url, format!("HTTP {}", status)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| RiaError::source_read(url, e))?;

        let document = Html::parse_document(&html);

        Ok(ScrapedContent {
            title: extract_title(&document),
            content: extract_content(&document),
            url: url.to_string(),
        })
    }
}
