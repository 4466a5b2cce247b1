//! 소스 수집 모듈
//!
//! `raw/` 폴더의 문서 파일과 `web_urls.txt`의 URL 목록을 수집하여
//! 수집 대상 `DocumentSource` 목록을 만듭니다.
//! .gitignore 패턴을 존중하고, 지원하는 확장자만 수집합니다.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use url::Url;

use crate::error::{Result, RiaError};
use crate::knowledge::DocumentSource;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// PDF 파일 (폼피드로 페이지 구분)
    Pdf,
    /// Word 문서
    Docx,
    /// 텍스트 / 마크다운
    Text,
    /// 저장된 HTML 페이지
    Html,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "txt" | "md" => Some(FileType::Text),
            "html" | "htm" => Some(FileType::Html),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 파일에서 CollectedFile 생성 (지원하지 않는 확장자는 `None`)
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let Some(file_type) = FileType::from_path(&path) else {
            return Ok(None);
        };

        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            file_type,
            size: metadata.len(),
        }))
    }

    /// 문서 ID로 쓰이는 파일 이름
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    pub fn to_source(&self) -> DocumentSource {
        DocumentSource::file(self.file_name(), self.path.to_string_lossy())
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 탐색 깊이 (`Some(1)`: 폴더 바로 아래 파일만)
    pub max_depth: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 200 * 1024 * 1024,
            max_depth: Some(1),
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 수집 (경로순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.is_dir() {
            return Err(RiaError::InvalidInput(format!(
                "Not a directory: {:?}",
                path
            )));
        }

        let mut files = Vec::new();

        // ignore 크레이트로 .gitignore 지원
        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .max_depth(self.config.max_depth)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {
                    tracing::debug!("Skipping unsupported file: {:?}", entry.path());
                }
                Err(e) => {
                    tracing::warn!("Failed to collect file {:?}: {}", entry.path(), e);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("Collected {} files from {:?}", files.len(), path);
        Ok(files)
    }

    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::warn!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }
        true
    }
}

// ============================================================================
// URL list
// ============================================================================

/// URL 목록 파일 읽기 (한 줄에 하나, 빈 줄 무시)
///
/// 해석할 수 없는 URL은 경고 후 건너뜁니다. 파일이 없으면 빈 목록입니다.
pub fn load_url_list(path: &Path) -> Result<Vec<Url>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path)?;
    let mut urls = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match Url::parse(line) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => urls.push(url),
            Ok(url) => tracing::warn!("Skipping unsupported URL scheme: {}", url),
            Err(e) => tracing::warn!("Skipping invalid URL {:?}: {}", line, e),
        }
    }

    Ok(urls)
}

/// 수집 대상 소스 전체 (파일 먼저, 그다음 URL)
///
/// `raw_dir`가 없으면 파일 소스는 비어 있습니다.
pub fn discover_sources(raw_dir: &Path, url_list: &Path) -> Result<Vec<DocumentSource>> {
    let mut sources = Vec::new();

    if raw_dir.is_dir() {
        let files = FileCollector::with_defaults().collect_directory(raw_dir)?;
        sources.extend(files.iter().map(CollectedFile::to_source));
    } else {
        tracing::debug!("Raw directory {:?} does not exist", raw_dir);
    }

    sources.extend(
        load_url_list(url_list)?
            .into_iter()
            .map(|url| DocumentSource::url(url.as_str())),
    );

    Ok(sources)
}

// ============================================================================
// Tests
// ============================================================================
