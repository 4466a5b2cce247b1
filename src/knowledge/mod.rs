//! Knowledge 모듈 - 버전 관리 + 하이브리드 검색 지식 저장소
//!
//! - Manifest: 추가 전용 문서 버전 로그, 변경 감지
//! - Chunker: 오버랩 토큰 윈도우 분할 + 조항 라벨
//! - Store: 청크 레코드 JSONL
//! - Dense: 정확 내적 검색 벡터 저장소
//! - Hybrid: 밀집 재현 + BM25 재정렬 (질의 확장 포함)

mod chunker;
mod dense;
mod expansion;
mod hybrid;
mod lexical;
mod manifest;
mod store;

// Re-exports
pub use chunker::{chunk_page, guess_clause_label, split, ChunkConfig, PageChunk, TokenWindows};
pub use dense::{dot, l2_normalize, DenseStore, ScoredChunk, VectorRecord, INDEX_FILE, META_FILE};
pub use expansion::{
    expand_query, expansion_terms, ExpansionRule, EXPANSION_RULES, MAX_EXPANSION_TERMS,
};
pub use hybrid::{HybridRetriever, IndexSnapshot, RetrievalResult};
pub use lexical::{tokenize, Bm25, Bm25Params, WhitespaceTokenizer};
pub use manifest::{
    normalize_pages, version_hash, DocumentSource, DocumentVersion, Registration, SourceKind,
    VersionManager, VersionState,
};
pub use store::{get_data_dir, ChunkRecord, ChunkRef, ChunkStore};
