//! 하이브리드 검색 - 밀집 재현(dense recall) + BM25 재정렬
//!
//! 1단계: 확장된 질의를 TF-IDF 벡터로 바꿔 밀집 저장소에서 `2 × top_k` 후보를 가져옵니다.
//! 2단계: 후보 텍스트만으로 BM25 모델을 만들어 확장 질의 토큰으로 재정렬합니다.
//! 동점은 1단계 순위를 유지합니다.
//!
//! 검색기는 불변 스냅샷(`Arc<IndexSnapshot>`) 위에서 동작하므로
//! 재인덱싱 도중에도 진행 중인 질의는 이전 세대를 일관되게 봅니다.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::embedding::TfIdfVectorizer;
use crate::error::{Result, RiaError};

use super::dense::DenseStore;
use super::expansion::expand_query;
use super::lexical::Bm25;
use super::store::{ChunkRecord, ChunkRef};

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 (요청 범위, 저장되지 않음)
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: ChunkRecord,
    /// 1단계 코사인 유사도
    pub dense_score: f32,
    /// 2단계 BM25 점수
    pub lexical_score: f64,
    /// 최종 순위 (0부터)
    pub rank: usize,
}

impl RetrievalResult {
    pub fn chunk_ref(&self) -> ChunkRef {
        self.chunk.chunk_ref()
    }
}

// ============================================================================
// IndexSnapshot
// ============================================================================

/// 벡터라이저 + 밀집 저장소 한 세대
///
/// 두 구성요소는 같은 세대 ID와 같은 차원을 공유해야 합니다.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    vectorizer: TfIdfVectorizer,
    dense: DenseStore,
}

impl IndexSnapshot {
    /// 아직 색인되지 않은 빈 스냅샷
    pub fn empty() -> Self {
        Self::default()
    }

    /// 학습된 벡터라이저와 그 벡터로 만든 저장소로 구성
    pub fn new(vectorizer: TfIdfVectorizer, dense: DenseStore) -> Result<Self> {
        if !vectorizer.is_fitted() {
            return Err(RiaError::NotReady(
                "snapshot requires a fitted vectorizer".to_string(),
            ));
        }
        if !dense.is_empty() && dense.dimension() != vectorizer.dimension() {
            return Err(RiaError::DimensionMismatch {
                expected: vectorizer.dimension(),
                actual: dense.dimension(),
            });
        }
        Ok(Self { vectorizer, dense })
    }

    /// 디스크에서 세대 쌍 로드
    ///
    /// 아무 파일도 없으면 빈 스냅샷. 한쪽만 있거나 세대/차원이 어긋나면 `PersistenceCorruption`.
    pub fn load(dir: &Path) -> Result<Self> {
        let vectorizer = TfIdfVectorizer::load(dir)?;
        let dense = DenseStore::load(dir)?;

        match (vectorizer, dense) {
            (None, None) => Ok(Self::empty()),
            (Some(vectorizer), Some((dense, generation))) => {
                if vectorizer.generation() != Some(generation) {
                    return Err(RiaError::PersistenceCorruption(format!(
                        "vectorizer generation {:?} does not match index generation {}",
                        vectorizer.generation(),
                        generation
                    )));
                }
                if dense.dimension() != vectorizer.dimension() {
                    return Err(RiaError::PersistenceCorruption(format!(
                        "vectorizer dimension {} does not match index dimension {}",
                        vectorizer.dimension(),
                        dense.dimension()
                    )));
                }
                tracing::debug!("Loaded index snapshot (generation={})", generation);
                Ok(Self { vectorizer, dense })
            }
            (Some(_), None) => Err(RiaError::PersistenceCorruption(format!(
                "vectorizer present without dense index in {:?}",
                dir
            ))),
            (None, Some(_)) => Err(RiaError::PersistenceCorruption(format!(
                "dense index present without vectorizer in {:?}",
                dir
            ))),
        }
    }

    /// 벡터라이저 먼저, 인덱스 마지막으로 저장
    pub fn save(&self, dir: &Path) -> Result<()> {
        let generation = self
            .generation()
            .ok_or_else(|| RiaError::NotReady("cannot persist an empty snapshot".to_string()))?;
        self.vectorizer.save(dir)?;
        self.dense.save(dir, generation)
    }

    pub fn generation(&self) -> Option<Uuid> {
        self.vectorizer.generation()
    }

    pub fn vectorizer(&self) -> &TfIdfVectorizer {
        &self.vectorizer
    }

    pub fn dense(&self) -> &DenseStore {
        &self.dense
    }

    pub fn is_ready(&self) -> bool {
        self.vectorizer.is_fitted()
    }
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
pub struct HybridRetriever {
    snapshot: Arc<IndexSnapshot>,
}

impl HybridRetriever {
    pub fn new(snapshot: Arc<IndexSnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &IndexSnapshot {
        &self.snapshot
    }

    /// 질문으로 상위 `top_k` 구절 검색
    ///
    /// - 벡터라이저가 학습되지 않았으면 `NotReady`
    /// - 저장소가 비었으면 빈 결과
    /// - 결과는 최대 `top_k`개, `(doc_id, version_hash, chunk_id)` 중복 없음
    pub fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        if !self.snapshot.is_ready() {
            return Err(RiaError::NotReady(
                "index has not been built yet; run ingestion first".to_string(),
            ));
        }
        if top_k == 0 || self.snapshot.dense.is_empty() {
            return Ok(Vec::new());
        }

        let expanded = expand_query(question);
        let query_vector = self
            .snapshot
            .vectorizer
            .transform(&[expanded.as_str()])?
            .pop()
            .unwrap_or_default();

        // 1. 밀집 재현 (오버샘플링)
        let hits = self.snapshot.dense.search(&query_vector, top_k.saturating_mul(2))?;

        let mut seen: HashSet<ChunkRef> = HashSet::with_capacity(hits.len());
        let candidates: Vec<_> = hits
            .into_iter()
            .filter(|hit| seen.insert(hit.chunk.chunk_ref()))
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // 2. 후보 위의 BM25 재정렬
        let texts: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        let bm25 = Bm25::new(&texts);
        let lexical = bm25.scores(&expanded);

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        // 안정 정렬 - 동점이면 밀집 순위 유지
        order.sort_by(|&a, &b| {
            lexical[b]
                .partial_cmp(&lexical[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(top_k);

        tracing::debug!(
            "Retrieved {} of {} candidates for query ({} chars expanded)",
            order.len(),
            candidates.len(),
            expanded.len()
        );

        Ok(order
            .into_iter()
            .enumerate()
            .map(|(rank, i)| RetrievalResult {
                chunk: candidates[i].chunk.clone(),
                dense_score: candidates[i].score,
                lexical_score: lexical[i],
                rank,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::store::tests::chunk;
    use tempfile::TempDir;

    fn corpus() -> Vec<ChunkRecord> {
        vec![
            chunk("gmp.pdf", "1-0", "Section 5 requires storage at 2-8 °C during transport."),
            chunk("gmp.pdf", "2-0", "Records must be kept for five years after release."),
            chunk("donor.pdf", "1-0", "Donors from malaria endemic areas must be deferred."),
            chunk("donor.pdf", "2-0", "Donor eligibility must be confirmed before collection."),
            chunk("label.pdf", "1-0", "Labels must show storage conditions and expiry date."),
            chunk("label.pdf", "2-0", "Transport containers must be validated for temperature."),
        ]
    }

    fn snapshot(records: Vec<ChunkRecord>) -> IndexSnapshot {
        let texts: Vec<&str> = records.iter().map(|c| c.text.as_str()).collect();
        let mut vectorizer = TfIdfVectorizer::default();
        vectorizer.fit(&texts).unwrap();
        let vectors = vectorizer.transform(&texts).unwrap();

        let mut dense = DenseStore::new();
        dense.build(vectors, records).unwrap();
        IndexSnapshot::new(vectorizer, dense).unwrap()
    }

    #[test]
    fn test_unfitted_index_is_not_ready() {
        let retriever = HybridRetriever::new(Arc::new(IndexSnapshot::empty()));
        let err = retriever.retrieve("anything", 3).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotReady);
    }

    #[test]
    fn test_results_are_bounded_and_unique() {
        let retriever = HybridRetriever::new(Arc::new(snapshot(corpus())));

        for k in [1, 2, 3, 6, 20] {
            let results = retriever.retrieve("storage must be transport", k).unwrap();
            assert!(results.len() <= k);

            let refs: HashSet<ChunkRef> = results.iter().map(|r| r.chunk_ref()).collect();
            assert_eq!(refs.len(), results.len());

            for (i, r) in results.iter().enumerate() {
                assert_eq!(r.rank, i);
            }
        }

        assert!(retriever.retrieve("storage", 0).unwrap().is_empty());
    }

    #[test]
    fn test_huge_top_k_returns_every_chunk() {
        let retriever = HybridRetriever::new(Arc::new(snapshot(corpus())));
        let results = retriever.retrieve("storage", usize::MAX).unwrap();
        assert_eq!(results.len(), 6);
    }

    #[test]
    fn test_duplicate_rows_are_collapsed() {
        let mut records = corpus();
        records.push(records[0].clone());
        let retriever = HybridRetriever::new(Arc::new(snapshot(records)));

        let results = retriever.retrieve("storage at 2-8 °C", 10).unwrap();
        let refs: HashSet<ChunkRef> = results.iter().map(|r| r.chunk_ref()).collect();
        assert_eq!(refs.len(), results.len());
    }

    #[test]
    fn test_temperature_question_finds_storage_clause() {
        let retriever = HybridRetriever::new(Arc::new(snapshot(corpus())));
        let results = retriever
            .retrieve("What temperature must product be stored at?", 3)
            .unwrap();

        assert!(!results.is_empty());
        assert!(results
            .iter()
            .any(|r| r.chunk.text.starts_with("Section 5")));
        // 재정렬 점수는 내림차순
        for pair in results.windows(2) {
            assert!(pair[0].lexical_score >= pair[1].lexical_score);
        }
    }

    #[test]
    fn test_snapshot_rejects_mismatched_dimension() {
        let mut vectorizer = TfIdfVectorizer::default();
        vectorizer
            .fit(&["storage records", "storage records kept"])
            .unwrap();
        let mut dense = DenseStore::new();
        dense
            .build(vec![vec![1.0; vectorizer.dimension() + 1]], vec![chunk("a", "1-0", "x")])
            .unwrap();

        assert!(IndexSnapshot::new(vectorizer, dense).is_err());
    }

    #[test]
    fn test_snapshot_persistence_pairing() {
        let dir = TempDir::new().unwrap();
        assert!(!IndexSnapshot::load(dir.path()).unwrap().is_ready());

        let snap = snapshot(corpus());
        snap.save(dir.path()).unwrap();
        let loaded = IndexSnapshot::load(dir.path()).unwrap();
        assert_eq!(loaded.generation(), snap.generation());
        assert_eq!(loaded.dense().len(), 6);

        // 다른 세대의 벡터라이저로 교체하면 손상
        let mut other = TfIdfVectorizer::default();
        other
            .fit(&corpus().iter().map(|c| c.text.clone()).collect::<Vec<_>>())
            .unwrap();
        other.save(dir.path()).unwrap();
        let err = IndexSnapshot::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceCorruption);
    }

    #[test]
    fn test_half_pair_is_corruption() {
        let dir = TempDir::new().unwrap();
        let snap = snapshot(corpus());
        snap.vectorizer().save(dir.path()).unwrap();

        let err = IndexSnapshot::load(dir.path()).unwrap_err();
        assert!(err.is_fatal());
    }
}
