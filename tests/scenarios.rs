//! 수집 -> 검색 -> 답변 통합 시나리오
//!
//! 메모리 소스 리더와 스크립트 생성 백엔드를 사용하며,
//! 테스트마다 독립된 임시 데이터 디렉토리를 씁니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use tempfile::TempDir;

use ria_assist::knowledge::{version_hash, ChunkStore};
use ria_assist::{
    ChunkRecord, ComplianceStatus, DenseStore, DocumentSource, ErrorKind, GenerationBackend,
    GenerationRequest, HybridRetriever, IndexSnapshot, Pipeline, Result, RiaConfig, RiaError,
    SourceKind, SourceReader, TfIdfVectorizer, VersionManager,
};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct MemoryReader {
    pages: Mutex<HashMap<String, Vec<(u32, String)>>>,
}

impl MemoryReader {
    fn with(docs: &[(&str, &str)]) -> Arc<Self> {
        let reader = Self::default();
        for (locator, text) in docs {
            reader.put(locator, text);
        }
        Arc::new(reader)
    }

    fn put(&self, locator: &str, text: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(locator.to_string(), vec![(1, text.to_string())]);
    }
}

#[async_trait]
impl SourceReader for MemoryReader {
    async fn extract(&self, _kind: SourceKind, locator: &str) -> Result<Vec<(u32, String)>> {
        self.pages
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| RiaError::SourceRead {
                locator: locator.to_string(),
                reason: "no such document".to_string(),
            })
    }
}

/// 고정 응답을 돌려주고 호출 횟수를 셈
struct Scripted {
    reply: std::result::Result<String, String>,
    calls: Mutex<usize>,
}

impl Scripted {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: Mutex::new(0),
        })
    }

    fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl GenerationBackend for Scripted {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        self.reply.clone().map_err(RiaError::FatalBackend)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

const SECTION_5: &str = "Section 5 requires storage at 2-8 °C.";

const CORPUS: &[(&str, &str)] = &[
    ("mem://gmp", SECTION_5),
    ("mem://labels", "Labels must state the product name and the expiry date."),
    ("mem://donors", "Donors from malaria endemic areas must be deferred for 120 days."),
    ("mem://records", "Records must be retained for five years."),
];

fn sources() -> Vec<DocumentSource> {
    CORPUS
        .iter()
        .map(|(locator, _)| {
            let id = format!("{}.txt", locator.trim_start_matches("mem://"));
            DocumentSource::file(id, *locator)
        })
        .collect()
}

fn open(dir: &TempDir, reader: Arc<MemoryReader>, backend: Arc<Scripted>) -> Pipeline {
    Pipeline::with_components(RiaConfig::with_data_dir(dir.path()), reader, backend).unwrap()
}

async fn indexed_corpus(dir: &TempDir, backend: Arc<Scripted>) -> Pipeline {
    let pipeline = open(dir, MemoryReader::with(CORPUS), backend);
    pipeline.reindex_sources(&sources()).await.unwrap();
    pipeline
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn single_page_document_yields_one_labelled_chunk() {
    let dir = TempDir::new().unwrap();
    let pipeline = open(
        &dir,
        MemoryReader::with(&[("mem://gmp", SECTION_5)]),
        Scripted::replying("{}"),
    );

    let report = pipeline
        .reindex_sources(&[DocumentSource::file("gmp.txt", "mem://gmp")])
        .await
        .unwrap();
    assert_eq!(report.chunks_written, 1);
    assert_eq!(report.new_versions, 1);

    let chunks = ChunkStore::new(&pipeline.config().chunks_path()).load().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, SECTION_5);
    assert_eq!(chunks[0].clause.as_deref(), Some("Section 5"));
    assert_eq!(chunks[0].page, 1);
    assert_eq!(chunks[0].version_hash, version_hash(SECTION_5));
}

#[tokio::test]
async fn reingesting_identical_content_keeps_manifest() {
    let dir = TempDir::new().unwrap();
    let pipeline = indexed_corpus(&dir, Scripted::replying("{}")).await;
    let config = pipeline.config().clone();

    let manifest_before = std::fs::read(config.manifest_path()).unwrap();
    let chunks_before = ChunkStore::new(&config.chunks_path()).load().unwrap();

    let report = pipeline.reindex_sources(&sources()).await.unwrap();
    assert_eq!(report.new_versions, 0);

    let manifest_after = std::fs::read(config.manifest_path()).unwrap();
    assert_eq!(manifest_before, manifest_after);

    let chunks_after = ChunkStore::new(&config.chunks_path()).load().unwrap();
    assert_eq!(chunks_before.len(), chunks_after.len());
    for (before, after) in chunks_before.iter().zip(&chunks_after) {
        assert_eq!(before.chunk_ref(), after.chunk_ref());
        assert_eq!(before.version_hash, after.version_hash);
    }
    assert_eq!(pipeline.history("gmp.txt").await.len(), 1);
}

#[tokio::test]
async fn temperature_question_ranks_storage_clause_first() {
    let dir = TempDir::new().unwrap();
    let pipeline = indexed_corpus(&dir, Scripted::replying("{}")).await;

    let results = pipeline
        .retrieve("What temperature must product be stored at?", 3)
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].chunk.doc_id, "gmp.txt");
    assert_eq!(results[0].rank, 0);
    assert!(results[0].lexical_score > 0.0);
}

#[tokio::test]
async fn unparseable_generation_falls_back_to_grounded_record() {
    let dir = TempDir::new().unwrap();
    let backend = Scripted::replying("Sorry, I cannot produce JSON today.");
    let pipeline = indexed_corpus(&dir, backend.clone()).await;

    let answer = pipeline
        .answer("What temperature must product be stored at?", 3)
        .await
        .unwrap();

    assert_eq!(backend.calls(), 1);
    assert_eq!(answer.compliance_status, ComplianceStatus::Unclear);
    assert!(answer.human_supervision_required);
    assert!(!answer.citations.is_empty());
    assert_eq!(answer.citations[0].source, "gmp.txt");
    assert!(answer.rationale.contains("cannot produce JSON"));
    assert!(!answer.violations_or_risks.is_empty());
}

#[test]
fn dense_store_self_retrieval() {
    let vectors = vec![
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ];
    let metadata: Vec<ChunkRecord> = (0..3)
        .map(|i| ChunkRecord {
            doc_id: "doc.txt".to_string(),
            version_hash: "h".to_string(),
            page: 1,
            chunk_id: format!("1-{}", i),
            text: format!("chunk {}", i),
            source: "doc.txt".to_string(),
            clause: None,
        })
        .collect();

    let mut store = DenseStore::new();
    store.build(vectors.clone(), metadata.clone()).unwrap();

    let hits = store.search(&vectors[1], 3).unwrap();
    assert_eq!(hits[0].row_index, 1);
    assert_eq!(hits[0].chunk, metadata[1]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn supervision_follows_status() {
    let cases = [
        ("Compliant", ComplianceStatus::Compliant, false),
        ("Not Compliant", ComplianceStatus::NotCompliant, true),
        ("Unclear", ComplianceStatus::Unclear, true),
    ];

    for (raw, expected, supervised) in cases {
        let dir = TempDir::new().unwrap();
        // 백엔드가 주장하는 플래그는 무시됨
        let reply = format!(
            r#"{{"compliance_status": "{}", "rationale": "Per Section 5.", "citations": [],
               "human_supervision_required": {}}}"#,
            raw, !supervised
        );
        let pipeline = indexed_corpus(&dir, Scripted::replying(&reply)).await;

        let answer = pipeline.answer("Is storage at 2-8 °C required?", 3).await.unwrap();
        assert_eq!(answer.compliance_status, expected);
        assert_eq!(answer.human_supervision_required, supervised);
        assert!(!answer.citations.is_empty());
    }
}

#[tokio::test]
async fn backend_failure_is_the_only_hard_error() {
    let dir = TempDir::new().unwrap();
    let backend = Scripted::failing("gave up after 3 attempts");
    let pipeline = indexed_corpus(&dir, backend.clone()).await;

    let err = pipeline.answer("storage temperature", 3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FatalBackend);
    assert!(err.is_fatal());

    // 검색 결과가 없으면 백엔드를 호출하지 않음
    let empty_dir = TempDir::new().unwrap();
    let unused = Scripted::failing("unreachable");
    let empty = open(&empty_dir, MemoryReader::with(&[]), unused.clone());
    let answer = empty.answer("storage temperature", 3).await.unwrap();
    assert_eq!(answer.compliance_status, ComplianceStatus::Unclear);
    assert!(answer.citations.is_empty());
    assert_eq!(unused.calls(), 0);
}

#[tokio::test]
async fn unreadable_sources_do_not_abort_batch() {
    let dir = TempDir::new().unwrap();
    let pipeline = open(&dir, MemoryReader::with(CORPUS), Scripted::replying("{}"));

    let mut all = sources();
    all.insert(1, DocumentSource::url("https://example.org/missing"));

    let report = pipeline.reindex_sources(&all).await.unwrap();
    assert_eq!(report.sources_seen, 5);
    assert_eq!(report.sources_skipped, 1);
    assert_eq!(report.chunks_written, 4);
    assert_eq!(pipeline.status().await.documents, 4);
}

#[tokio::test]
async fn newer_manifest_version_is_reread_from_its_locator() {
    let dir = TempDir::new().unwrap();
    let config = RiaConfig::with_data_dir(dir.path());
    let revised = "Section 5 requires storage at 2-8 °C with continuous monitoring.";

    // 다른 위치에 기록된 더 최신 버전
    {
        let mut manifest = VersionManager::open(&config.manifest_path()).unwrap();
        manifest
            .register_at(
                "gmp.txt",
                revised,
                SourceKind::File,
                "mem://gmp-rev2",
                Utc::now() + Duration::days(1),
            )
            .unwrap();
    }

    let reader = MemoryReader::with(&[("mem://gmp", SECTION_5), ("mem://gmp-rev2", revised)]);
    let pipeline = open(&dir, reader, Scripted::replying("{}"));
    pipeline
        .reindex_sources(&[DocumentSource::file("gmp.txt", "mem://gmp")])
        .await
        .unwrap();

    let chunks = ChunkStore::new(&config.chunks_path()).load().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, revised);
    assert_eq!(chunks[0].version_hash, version_hash(revised));
    assert_eq!(pipeline.history("gmp.txt").await.len(), 2);
}

#[tokio::test]
async fn stale_latest_locator_indexes_current_content() {
    let dir = TempDir::new().unwrap();
    let config = RiaConfig::with_data_dir(dir.path());
    {
        let mut manifest = VersionManager::open(&config.manifest_path()).unwrap();
        manifest
            .register_at(
                "gmp.txt",
                "an older draft that is gone",
                SourceKind::File,
                "mem://vanished",
                Utc::now() + Duration::days(1),
            )
            .unwrap();
    }

    let pipeline = open(
        &dir,
        MemoryReader::with(&[("mem://gmp", SECTION_5)]),
        Scripted::replying("{}"),
    );
    pipeline
        .reindex_sources(&[DocumentSource::file("gmp.txt", "mem://gmp")])
        .await
        .unwrap();

    let chunks = ChunkStore::new(&config.chunks_path()).load().unwrap();
    assert_eq!(chunks[0].text, SECTION_5);
    assert_eq!(chunks[0].version_hash, version_hash(SECTION_5));
}

fn duplicated_snapshot() -> Arc<IndexSnapshot> {
    let texts: Vec<&str> = CORPUS.iter().map(|(_, text)| *text).collect();
    let mut records: Vec<ChunkRecord> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| ChunkRecord {
            doc_id: format!("doc{}.txt", i),
            version_hash: version_hash(text),
            page: 1,
            chunk_id: "1-0".to_string(),
            text: text.to_string(),
            source: format!("doc{}.txt", i),
            clause: None,
        })
        .collect();
    // 같은 참조를 가진 행을 하나 더
    records.push(records[0].clone());
    let mut all_texts = texts.clone();
    all_texts.push(texts[0]);

    let mut vectorizer = TfIdfVectorizer::default();
    vectorizer.fit(&all_texts).unwrap();
    let vectors = vectorizer.transform(&all_texts).unwrap();
    let mut dense = DenseStore::new();
    dense.build(vectors, records).unwrap();
    Arc::new(IndexSnapshot::new(vectorizer, dense).unwrap())
}

proptest! {
    #[test]
    fn retrieval_is_bounded_and_deduplicated(
        words in prop::collection::vec(
            prop::sample::select(vec![
                "storage", "temperature", "malaria", "donor", "label", "must", "records", "2-8",
            ]),
            1..6,
        ),
        top_k in 0usize..10,
    ) {
        let retriever = HybridRetriever::new(duplicated_snapshot());
        let results = retriever.retrieve(&words.join(" "), top_k).unwrap();

        prop_assert!(results.len() <= top_k);
        let mut refs: Vec<_> = results.iter().map(|r| r.chunk_ref()).collect();
        let before = refs.len();
        refs.sort();
        refs.dedup();
        prop_assert_eq!(refs.len(), before);
    }
}
