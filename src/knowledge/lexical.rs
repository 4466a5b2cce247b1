//! Lexical Rerank - BM25 스코어링
//!
//! 전체 코퍼스가 아닌 1단계 후보 텍스트만으로 모델을 만들어
//! 재정렬 비용을 후보 수로 제한합니다. 스코어링은 `bm25` 크레이트의
//! Embedder + Scorer를 쓰고, 토큰화는 소문자 + 공백 분할로 고정합니다.

use bm25::{Embedder, EmbedderBuilder, Scorer, Tokenizer};

/// 소문자 + 공백 분할 토큰화
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// `tokenize`를 bm25 임베더에 연결
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        tokenize(input_text)
    }
}

/// BM25 파라미터
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// 후보 집합 위의 BM25 모델
pub struct Bm25 {
    embedder: Embedder<u32, WhitespaceTokenizer>,
    scorer: Scorer<usize>,
    len: usize,
}

impl Bm25 {
    pub fn new(corpus: &[&str]) -> Self {
        Self::with_params(corpus, Bm25Params::default())
    }

    /// 후보 텍스트로 평균 길이를 맞추고 각 문서를 코퍼스 순서 키로 등록
    pub fn with_params(corpus: &[&str], params: Bm25Params) -> Self {
        let builder = if corpus.is_empty() {
            EmbedderBuilder::<u32, WhitespaceTokenizer>::with_avgdl(1.0)
                .tokenizer(WhitespaceTokenizer)
        } else {
            EmbedderBuilder::<u32, WhitespaceTokenizer>::with_tokenizer_and_fit_to_corpus(
                WhitespaceTokenizer,
                corpus,
            )
        };
        let embedder = builder.k1(params.k1).b(params.b).build();

        let mut scorer = Scorer::<usize>::new();
        for (i, doc) in corpus.iter().enumerate() {
            scorer.upsert(&i, embedder.embed(doc));
        }

        Self {
            embedder,
            scorer,
            len: corpus.len(),
        }
    }

    /// 모든 문서에 대한 점수 (코퍼스 순서, 일치 항이 없으면 0)
    pub fn scores(&self, query: &str) -> Vec<f64> {
        if self.len == 0 {
            return Vec::new();
        }

        let query = self.embedder.embed(query);
        (0..self.len)
            .map(|i| f64::from(self.scorer.score(&i, &query).unwrap_or(0.0)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
