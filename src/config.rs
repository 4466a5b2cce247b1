//! 설정 모듈
//!
//! 환경변수 + 기본값으로 `RiaConfig`를 구성합니다. CLI 플래그가 일부 값을 덮어씁니다.
//!
//! 데이터 디렉토리 구조:
//! ```text
//! <data_dir>/
//!   raw/              수집 대상 문서 파일
//!   web_urls.txt      수집 대상 URL (한 줄에 하나)
//!   index/
//!     meta.jsonl              문서 버전 매니페스트 (추가 전용)
//!     chunks.jsonl            청크 레코드
//!     tfidf_vectorizer.json   벡터라이저 상태
//!     index.bin               밀집 인덱스
//!     index_meta.jsonl        인덱스 행 메타데이터
//! ```

use std::path::{Path, PathBuf};

use crate::embedding::VectorizerConfig;
use crate::generation::GenerationConfig;
use crate::knowledge::{get_data_dir, ChunkConfig};

/// 매니페스트 파일 이름
pub const MANIFEST_FILE: &str = "meta.jsonl";
/// 청크 파일 이름
pub const CHUNKS_FILE: &str = "chunks.jsonl";
/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 6;

/// 전체 설정
#[derive(Debug, Clone)]
pub struct RiaConfig {
    pub data_dir: PathBuf,
    /// 수집 시 청킹
    pub chunking: ChunkConfig,
    pub vectorizer: VectorizerConfig,
    pub top_k: usize,
    pub generation: GenerationConfig,
}

impl RiaConfig {
    /// 지정한 데이터 디렉토리로 생성 (생성 백엔드 설정은 기본값)
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            chunking: ChunkConfig::for_ingest(),
            vectorizer: VectorizerConfig::default(),
            top_k: DEFAULT_TOP_K,
            generation: GenerationConfig::default(),
        }
    }

    /// 환경변수에서 로드
    ///
    /// - `RIA_DATA_DIR`: 데이터 디렉토리 (기본: `~/.local/share/.ria-assist`)
    /// - `RIA_TOP_K`: 기본 검색 개수
    /// - `OPENAI_*`: 생성 백엔드 (`GenerationConfig::from_env`)
    pub fn from_env() -> Self {
        let data_dir = std::env::var("RIA_DATA_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(get_data_dir);

        let top_k = std::env::var("RIA_TOP_K")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&k| k > 0)
            .unwrap_or(DEFAULT_TOP_K);

        Self {
            top_k,
            generation: GenerationConfig::from_env(),
            ..Self::with_data_dir(data_dir)
        }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn url_list_path(&self) -> PathBuf {
        self.data_dir.join("web_urls.txt")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.index_dir().join(MANIFEST_FILE)
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.index_dir().join(CHUNKS_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for RiaConfig {
    fn default() -> Self {
        Self::with_data_dir(get_data_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let config = RiaConfig::with_data_dir("/tmp/ria");
        assert_eq!(config.raw_dir(), PathBuf::from("/tmp/ria/raw"));
        assert_eq!(config.url_list_path(), PathBuf::from("/tmp/ria/web_urls.txt"));
        assert_eq!(config.manifest_path(), PathBuf::from("/tmp/ria/index/meta.jsonl"));
        assert_eq!(config.chunks_path(), PathBuf::from("/tmp/ria/index/chunks.jsonl"));
    }

    #[test]
    fn test_defaults() {
        let config = RiaConfig::with_data_dir("/tmp/ria");
        assert_eq!(config.chunking, ChunkConfig::for_ingest());
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.vectorizer.ngram_range, (1, 2));
        assert_eq!(config.generation.model, "gpt-4o-mini");
    }
}
