//! 임베딩 모듈 - TF-IDF 벡터화
//!
//! 전체 코퍼스 스냅샷 위에서 어휘와 IDF를 한 번에 학습(fit)하고,
//! 같은 상태로 색인 시점과 질의 시점의 텍스트를 벡터로 변환합니다.
//!
//! 학습할 때마다 새 세대(generation) ID가 발급됩니다. 밀집 인덱스 헤더도 같은 ID를
//! 기록하므로, 다른 세대의 벡터라이저로 질의하는 상황을 로드 시점에 잡아낼 수 있습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let mut vectorizer = TfIdfVectorizer::new(VectorizerConfig::default());
//! vectorizer.fit(&corpus)?;
//! let rows = vectorizer.transform(&["storage temperature"])?;
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RiaError};

/// 벡터라이저 저장 파일 이름
pub const VECTORIZER_FILE: &str = "tfidf_vectorizer.json";

const FORMAT_VERSION: u32 = 1;

// ============================================================================
// Config
// ============================================================================

/// 벡터라이저 설정
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// 단어 n-gram 범위 (최소, 최대)
    pub ngram_range: (usize, usize),
    /// 최소 문서 빈도 (문서 수)
    pub min_df: usize,
    /// 최대 문서 빈도 (비율)
    pub max_df: f64,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            ngram_range: (1, 2),
            min_df: 2,
            max_df: 0.9,
        }
    }
}

// ============================================================================
// Analyzer
// ============================================================================

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"))
}

/// 소문자화 후 2글자 이상 단어 토큰 추출
pub fn word_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 토큰에서 n-gram 생성 (공백으로 연결)
fn ngrams(tokens: &[String], (min_n, max_n): (usize, usize)) -> Vec<String> {
    let min_n = min_n.max(1);
    let mut out = Vec::new();

    for n in min_n..=max_n {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            out.push(window.join(" "));
        }
    }

    out
}

// ============================================================================
// TfIdfVectorizer
// ============================================================================

/// TF-IDF 벡터라이저
///
/// - IDF: `ln((1 + n) / (1 + df)) + 1` (smooth)
/// - TF: 원시 빈도
/// - 출력 행은 L2 정규화
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    #[serde(default = "format_version")]
    format: u32,
    config: VectorizerConfig,
    generation: Option<Uuid>,
    /// 용어 -> 열 번호 (용어 사전순)
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f32>,
}

fn format_version() -> u32 {
    FORMAT_VERSION
}

impl TfIdfVectorizer {
    /// 학습 전 상태로 생성
    pub fn new(config: VectorizerConfig) -> Self {
        Self {
            format: FORMAT_VERSION,
            config,
            generation: None,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        ngrams(&word_tokens(text), self.config.ngram_range)
    }

    /// 코퍼스 전체로 어휘와 IDF 학습
    ///
    /// 이전 상태는 완전히 교체되며 새 세대 ID가 발급됩니다.
    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<Uuid> {
        let n_docs = corpus.len();
        if n_docs == 0 {
            return Err(RiaError::InvalidInput(
                "cannot fit vectorizer on an empty corpus".to_string(),
            ));
        }

        let mut df: HashMap<String, usize> = HashMap::new();
        for doc in corpus {
            let unique: BTreeSet<String> = self.analyze(doc.as_ref()).into_iter().collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        if df.is_empty() {
            return Err(RiaError::InvalidInput(
                "corpus produced an empty vocabulary".to_string(),
            ));
        }

        // 작은 코퍼스에서도 min_df가 문서 수를 넘지 않도록
        let min_count = self.config.min_df.clamp(1, n_docs);
        let max_count = self.config.max_df * n_docs as f64;

        let mut kept: BTreeMap<String, usize> = df
            .iter()
            .filter(|(_, &count)| count >= min_count && count as f64 <= max_count)
            .map(|(term, &count)| (term.clone(), count))
            .collect();

        if kept.is_empty() {
            tracing::warn!(
                "Document-frequency pruning removed every term ({} docs, {} terms); using unpruned vocabulary",
                n_docs,
                df.len()
            );
            kept = df.into_iter().collect();
        }

        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (column, (term, count)) in kept.into_iter().enumerate() {
            let value = ((1.0 + n_docs as f64) / (1.0 + count as f64)).ln() + 1.0;
            idf.push(value as f32);
            vocabulary.insert(term, column);
        }

        let generation = Uuid::new_v4();
        self.vocabulary = vocabulary;
        self.idf = idf;
        self.generation = Some(generation);

        tracing::info!(
            "Fitted TF-IDF vectorizer ({} docs, {} terms, generation={})",
            n_docs,
            self.idf.len(),
            generation
        );

        Ok(generation)
    }

    /// 텍스트 목록을 L2 정규화된 행 벡터로 변환
    pub fn transform<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        if !self.is_fitted() {
            return Err(RiaError::NotReady(
                "vectorizer has not been fitted".to_string(),
            ));
        }

        Ok(texts.iter().map(|t| self.transform_one(t.as_ref())).collect())
    }

    fn transform_one(&self, text: &str) -> Vec<f32> {
        let mut row = vec![0.0f32; self.idf.len()];

        for term in self.analyze(text) {
            if let Some(&column) = self.vocabulary.get(&term) {
                row[column] += 1.0;
            }
        }
        for (value, idf) in row.iter_mut().zip(self.idf.iter()) {
            *value *= idf;
        }

        crate::knowledge::l2_normalize(&mut row);
        row
    }

    pub fn is_fitted(&self) -> bool {
        self.generation.is_some()
    }

    /// 학습 세대 ID
    pub fn generation(&self) -> Option<Uuid> {
        self.generation
    }

    /// 출력 벡터 차원 (어휘 크기)
    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, usize> {
        &self.vocabulary
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// JSON으로 저장 (임시 파일 후 rename)
    pub fn save(&self, dir: &Path) -> Result<()> {
        if !self.is_fitted() {
            return Err(RiaError::NotReady(
                "refusing to persist an unfitted vectorizer".to_string(),
            ));
        }

        std::fs::create_dir_all(dir)?;
        let path = dir.join(VECTORIZER_FILE);
        let tmp_path = dir.join(format!("{}.tmp", VECTORIZER_FILE));
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;

        tracing::debug!("Saved vectorizer to {:?}", path);
        Ok(())
    }

    /// 저장된 상태 로드 (파일 없으면 `None`)
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(VECTORIZER_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(&path)?;
        let vectorizer: Self = serde_json::from_str(&text).map_err(|e| {
            RiaError::PersistenceCorruption(format!("{:?}: unreadable vectorizer: {}", path, e))
        })?;

        if vectorizer.format != FORMAT_VERSION {
            return Err(RiaError::PersistenceCorruption(format!(
                "{:?}: unsupported vectorizer format {}",
                path, vectorizer.format
            )));
        }
        if vectorizer.vocabulary.len() != vectorizer.idf.len()
            || vectorizer.vocabulary.values().any(|&c| c >= vectorizer.idf.len())
        {
            return Err(RiaError::PersistenceCorruption(format!(
                "{:?}: vocabulary does not match idf table",
                path
            )));
        }

        Ok(Some(vectorizer))
    }
}

impl Default for TfIdfVectorizer {
    fn default() -> Self {
        Self::new(VectorizerConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
