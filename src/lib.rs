//! ria-assist - 규제 준수 근거 검색 어시스턴트
//!
//! 규제 문서를 버전 관리하며 수집하고, TF-IDF 밀집 검색 + BM25 재순위의
//! 하이브리드 검색으로 근거 구절을 찾아 구조화된 준수 판단을 만듭니다.

pub mod answer;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod scraper;

// Re-exports
pub use answer::{AnswerAssembler, AnswerRecord, Citation, ComplianceStatus};
pub use config::RiaConfig;
pub use embedding::{TfIdfVectorizer, VectorizerConfig};
pub use error::{ErrorKind, Result, RiaError};
pub use extractor::{ContentExtractor, SourceReader};
pub use generation::{
    GenerationBackend, GenerationConfig, GenerationRequest, OpenAiGeneration, RetryPolicy,
};
pub use knowledge::{
    ChunkConfig, ChunkRecord, DenseStore, DocumentSource, DocumentVersion, HybridRetriever,
    IndexSnapshot, RetrievalResult, SourceKind, VersionManager,
};
pub use pipeline::{IngestReport, Pipeline, PipelineStatus};
pub use scraper::{ScrapedContent, WebScraper};
