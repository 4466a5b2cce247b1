//! 파이프라인 컨텍스트
//!
//! 매니페스트, 청크 저장소, 인덱스 스냅샷, 소스 리더, 생성 백엔드를 한 객체가 소유합니다.
//! 전역 상태가 없으므로 테스트마다 독립된 데이터 디렉토리로 병렬 실행할 수 있습니다.
//!
//! - 수집(`reindex`)은 단일 writer: 수집 잠금으로 직렬화하고, 매니페스트 잠금은
//!   소스별 등록 구간에서만 잡음 (소스 읽기 중에는 이력/상태 조회가 막히지 않음)
//! - 검색/답변은 읽기 전용: 현재 스냅샷(`Arc`)을 복제해 잠금 없이 사용
//! - 재인덱싱은 build-then-swap: 새 스냅샷을 완성하고 저장한 뒤에만 교체

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::answer::{answer_concise, answer_exact, AnswerAssembler, AnswerRecord};
use crate::collector::discover_sources;
use crate::config::RiaConfig;
use crate::embedding::TfIdfVectorizer;
use crate::error::Result;
use crate::extractor::{ContentExtractor, SourceReader};
use crate::generation::{GenerationBackend, OpenAiGeneration};
use crate::knowledge::{
    chunk_page, normalize_pages, version_hash, ChunkRecord, ChunkStore, DenseStore,
    DocumentSource, DocumentVersion, HybridRetriever, IndexSnapshot, RetrievalResult,
    VersionManager,
};

// ============================================================================
// Reports
// ============================================================================

/// 수집 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub sources_seen: usize,
    pub sources_skipped: usize,
    /// 매니페스트에 새로 추가된 버전 수
    pub new_versions: usize,
    pub chunks_written: usize,
    /// 현재 인덱스 세대 (청크가 없어 건너뛴 경우 이전 세대)
    pub generation: Option<Uuid>,
}

/// 상태 요약
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub data_dir: PathBuf,
    pub documents: usize,
    pub manifest_records: usize,
    pub indexed_chunks: usize,
    pub dimension: usize,
    pub generation: Option<Uuid>,
    pub backend: String,
}

// ============================================================================
// Pipeline
// ============================================================================

/// 수집 + 검색 + 답변 파이프라인
pub struct Pipeline {
    config: RiaConfig,
    reader: Arc<dyn SourceReader>,
    assembler: AnswerAssembler,
    manifest: Mutex<VersionManager>,
    /// 재인덱싱 직렬화
    ingest: Mutex<()>,
    chunks: ChunkStore,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl Pipeline {
    /// 기본 구성요소(파일/URL 추출기, OpenAI 백엔드)로 열기
    pub fn open(config: RiaConfig) -> Result<Self> {
        let reader = Arc::new(ContentExtractor::new()?);
        let backend = Arc::new(OpenAiGeneration::new(config.generation.clone())?);
        Self::with_components(config, reader, backend)
    }

    /// 구성요소를 지정하여 열기
    ///
    /// 저장된 인덱스 쌍이 어긋나 있으면 `PersistenceCorruption`으로 실패합니다.
    pub fn with_components(
        config: RiaConfig,
        reader: Arc<dyn SourceReader>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self> {
        let manifest = VersionManager::open(&config.manifest_path())?;
        let snapshot = IndexSnapshot::load(&config.index_dir())?;
        let chunks = ChunkStore::new(&config.chunks_path());

        tracing::info!(
            "Opened pipeline at {:?} ({} manifest records, {} indexed chunks)",
            config.data_dir(),
            manifest.record_count(),
            snapshot.dense().len()
        );

        Ok(Self {
            config,
            reader,
            assembler: AnswerAssembler::new(backend),
            manifest: Mutex::new(manifest),
            ingest: Mutex::new(()),
            chunks,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn config(&self) -> &RiaConfig {
        &self.config
    }

    /// 현재 인덱스 스냅샷
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap_snapshot(&self, next: IndexSnapshot) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// 데이터 디렉토리의 수집 대상 소스
    pub fn scan_sources(&self) -> Result<Vec<DocumentSource>> {
        discover_sources(&self.config.raw_dir(), &self.config.url_list_path())
    }

    /// 데이터 디렉토리 전체 재인덱싱
    pub async fn reindex(&self) -> Result<IngestReport> {
        let sources = self.scan_sources()?;
        self.reindex_sources(&sources).await
    }

    /// 주어진 소스로 전체 재인덱싱
    ///
    /// 소스별 읽기 실패는 경고 후 건너뜁니다. 청크가 하나도 없으면 기존 인덱스를 유지합니다.
    pub async fn reindex_sources(&self, sources: &[DocumentSource]) -> Result<IngestReport> {
        let _writer = self.ingest.lock().await;
        let mut report = IngestReport {
            sources_seen: sources.len(),
            ..Default::default()
        };
        let mut records: Vec<ChunkRecord> = Vec::new();

        for source in sources {
            let pages = match self.reader.read_source(source).await {
                Ok(pages) => pages,
                Err(e) => {
                    tracing::warn!("Skipping source {}: {}", source.id, e);
                    report.sources_skipped += 1;
                    continue;
                }
            };

            let normalized = normalize_pages(&pages);
            if normalized.trim().is_empty() {
                tracing::warn!("Skipping source {}: no text extracted", source.id);
                report.sources_skipped += 1;
                continue;
            }

            let (registration, state, latest) = {
                let mut manifest = self.manifest.lock().await;
                let prior_versions = manifest.version_count(&source.id);
                let registration =
                    manifest.register(&source.id, &normalized, source.kind, &source.locator)?;
                let state = registration.state(prior_versions);
                let latest = manifest.latest(&source.id).cloned();
                (registration, state, latest)
            };
            if registration.is_new {
                report.new_versions += 1;
            }

            let (hash, pages) = self
                .resolve_latest(latest, source, registration.version.version_hash, pages)
                .await;

            let before = records.len();
            for (page, text) in &pages {
                records.extend(chunk_page(*page, text, self.config.chunking).into_iter().map(
                    |chunk| ChunkRecord {
                        doc_id: source.id.clone(),
                        version_hash: hash.clone(),
                        page: chunk.page,
                        chunk_id: chunk.chunk_id,
                        text: chunk.text,
                        source: source.id.clone(),
                        clause: chunk.clause,
                    },
                ));
            }

            tracing::info!(
                "Indexed {} ({}, {:?}, {} chunks)",
                source.id,
                &hash[..12.min(hash.len())],
                state,
                records.len() - before
            );
        }

        if records.is_empty() {
            tracing::warn!("No chunks produced; keeping the existing index");
            report.generation = self.snapshot().generation();
            return Ok(report);
        }

        let next = self.build_snapshot(&records)?;
        let generation = next.generation();

        // 디스크에 완전히 기록한 뒤에만 교체
        self.chunks.replace_all(&records)?;
        next.save(&self.config.index_dir())?;
        self.swap_snapshot(next);

        report.chunks_written = records.len();
        report.generation = generation;

        tracing::info!(
            "Reindex complete: {} sources, {} skipped, {} new versions, {} chunks",
            report.sources_seen,
            report.sources_skipped,
            report.new_versions,
            report.chunks_written
        );

        Ok(report)
    }

    /// 매니페스트의 최신 버전이 방금 읽은 내용과 다르면 최신 레코드 위치에서 다시 읽음
    ///
    /// 다시 읽은 내용이 최신 해시와 일치할 때만 채택하고, 그렇지 않으면
    /// 방금 읽은 내용을 그 자신의 해시로 색인합니다.
    async fn resolve_latest(
        &self,
        latest: Option<DocumentVersion>,
        source: &DocumentSource,
        current_hash: String,
        pages: Vec<(u32, String)>,
    ) -> (String, Vec<(u32, String)>) {
        let Some(latest) = latest else {
            return (current_hash, pages);
        };
        if latest.version_hash == current_hash {
            return (current_hash, pages);
        }

        tracing::info!(
            "Latest manifest version of {} differs from current content; re-reading {}",
            source.id,
            latest.locator
        );

        match self.reader.extract(latest.source_kind, &latest.locator).await {
            Ok(latest_pages)
                if version_hash(&normalize_pages(&latest_pages)) == latest.version_hash =>
            {
                (latest.version_hash, latest_pages)
            }
            Ok(_) => {
                tracing::warn!(
                    "Content at {} no longer matches version {}; indexing current content",
                    latest.locator,
                    latest.version_hash
                );
                (current_hash, pages)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to re-read latest version of {} ({}); indexing current content",
                    source.id,
                    e
                );
                (current_hash, pages)
            }
        }
    }

    /// 전체 코퍼스로 벡터라이저 학습 + 밀집 저장소 구축
    fn build_snapshot(&self, records: &[ChunkRecord]) -> Result<IndexSnapshot> {
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();

        let mut vectorizer = TfIdfVectorizer::new(self.config.vectorizer);
        vectorizer.fit(&texts)?;
        let vectors = vectorizer.transform(&texts)?;

        let mut dense = DenseStore::new();
        dense.build(vectors, records.to_vec())?;

        IndexSnapshot::new(vectorizer, dense)
    }

    // ------------------------------------------------------------------------
    // Retrieval / Answering
    // ------------------------------------------------------------------------

    /// 하이브리드 검색
    pub fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        HybridRetriever::new(self.snapshot()).retrieve(question, top_k)
    }

    /// 답변용 검색: 하드 실패가 아닌 오류는 빈 결과로 취급
    fn evidence(&self, question: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        match self.retrieve(question, top_k) {
            Ok(passages) => Ok(passages),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!("Retrieval unavailable ({}); answering without evidence", e);
                Ok(Vec::new())
            }
        }
    }

    /// 근거 기반 구조화 답변
    ///
    /// 오류는 백엔드 재시도 소진과 인덱스 손상일 때만 반환됩니다.
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<AnswerRecord> {
        let passages = self.evidence(question, top_k)?;
        self.assembler.assemble(question, &passages).await
    }

    /// 조항 원문 목록 (생성 호출 없음)
    pub fn answer_exact(&self, question: &str, top_k: usize) -> Result<String> {
        Ok(answer_exact(&self.evidence(question, top_k)?))
    }

    /// 짧은 판정 (생성 호출 없음)
    pub fn answer_concise(&self, question: &str, top_k: usize) -> Result<String> {
        Ok(answer_concise(&self.evidence(question, top_k)?))
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// 문서 버전 이력 (기록 순)
    pub async fn history(&self, doc_id: &str) -> Vec<DocumentVersion> {
        self.manifest.lock().await.history(doc_id).to_vec()
    }

    /// 문서별 최신 버전
    pub async fn documents(&self) -> Vec<DocumentVersion> {
        let manifest = self.manifest.lock().await;
        manifest
            .doc_ids()
            .filter_map(|id| manifest.latest(id).cloned())
            .collect()
    }

    pub async fn status(&self) -> PipelineStatus {
        let manifest = self.manifest.lock().await;
        let snapshot = self.snapshot();

        PipelineStatus {
            data_dir: self.config.data_dir.clone(),
            documents: manifest.doc_ids().count(),
            manifest_records: manifest.record_count(),
            indexed_chunks: snapshot.dense().len(),
            dimension: snapshot.dense().dimension(),
            generation: snapshot.generation(),
            backend: self.assembler.backend_name().to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
