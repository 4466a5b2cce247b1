//! Dense Store - 정확한(brute-force) 내적 검색 벡터 저장소
//!
//! 벡터는 L2 정규화 후 손실 없이(f32) 저장하며, 내적 = 코사인 유사도입니다.
//! 디스크에는 바이너리 인덱스 파일과 행 정렬된 JSONL 메타데이터를 함께 기록합니다.
//! 메타데이터 i행은 인덱스 i행과 정확히 대응해야 합니다.
//!
//! 파일 형식 (little endian):
//! ```text
//! magic "RIADENSE" | format u32 | dim u32 | rows u64 | generation [16] | meta sha256 [32] | rows*dim f32
//! ```

use std::io::{BufWriter, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::store::{write_jsonl_atomic, ChunkRecord, ChunkRef};
use crate::error::{Result, RiaError};

const MAGIC: &[u8; 8] = b"RIADENSE";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8 + 16 + 32;

/// 인덱스 파일 이름
pub const INDEX_FILE: &str = "index.bin";
/// 메타데이터 파일 이름
pub const META_FILE: &str = "index_meta.jsonl";

// ============================================================================
// Types
// ============================================================================

/// 저장된 벡터 행
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub row_index: usize,
    pub chunk_ref: ChunkRef,
    pub vector: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub row_index: usize,
    pub chunk: ChunkRecord,
    /// 내적 (정규화 벡터이므로 코사인 유사도)
    pub score: f32,
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 벡터를 L2 정규화 (영벡터는 그대로)
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// 내적
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn metadata_digest(metadata: &[ChunkRecord]) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    for record in metadata {
        hasher.update(serde_json::to_vec(record)?);
        hasher.update(b"\n");
    }
    Ok(hasher.finalize().into())
}

// ============================================================================
// DenseStore
// ============================================================================

/// 정확 검색 벡터 저장소
///
/// 인덱스 세대 동안 차원은 고정입니다. 차원 변경은 `build`로 전체 재구축해야 합니다.
#[derive(Debug, Clone, Default)]
pub struct DenseStore {
    dimension: usize,
    /// 행 우선(row-major) 평탄화 벡터
    data: Vec<f32>,
    metadata: Vec<ChunkRecord>,
}

impl DenseStore {
    /// 빈 저장소
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장소를 통째로 교체 구축
    pub fn build(&mut self, vectors: Vec<Vec<f32>>, metadata: Vec<ChunkRecord>) -> Result<()> {
        let fresh = Self::from_rows(vectors, metadata)?;
        *self = fresh;
        tracing::debug!(
            "Built dense store ({} rows, dim={})",
            self.len(),
            self.dimension
        );
        Ok(())
    }

    /// 기존 인덱스 뒤에 행 추가 (증가 전용 모드)
    pub fn add(&mut self, vectors: Vec<Vec<f32>>, metadata: Vec<ChunkRecord>) -> Result<()> {
        if self.is_empty() && self.dimension == 0 {
            return self.build(vectors, metadata);
        }

        let incoming = Self::from_rows(vectors, metadata)?;
        if incoming.is_empty() {
            return Ok(());
        }
        if incoming.dimension != self.dimension {
            return Err(RiaError::DimensionMismatch {
                expected: self.dimension,
                actual: incoming.dimension,
            });
        }

        self.data.extend(incoming.data);
        self.metadata.extend(incoming.metadata);
        Ok(())
    }

    fn from_rows(vectors: Vec<Vec<f32>>, metadata: Vec<ChunkRecord>) -> Result<Self> {
        if vectors.len() != metadata.len() {
            return Err(RiaError::InvalidInput(format!(
                "metadata length {} does not match vectors {}",
                metadata.len(),
                vectors.len()
            )));
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(vectors.len() * dimension);

        for mut vector in vectors {
            if vector.len() != dimension {
                return Err(RiaError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            l2_normalize(&mut vector);
            data.extend(vector);
        }

        Ok(Self {
            dimension,
            data,
            metadata,
        })
    }

    /// 상위 `top_k` 검색
    ///
    /// 점수 내림차순, 동점은 원래 행 순서. 빈 저장소는 빈 결과를 반환합니다.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RiaError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .map(|row| dot(row, &q))
            .enumerate()
            .collect();

        // sort_by는 안정 정렬 - 동점이면 행 순서 유지
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(row_index, score)| ScoredChunk {
                row_index,
                chunk: self.metadata[row_index].clone(),
                score,
            })
            .collect())
    }

    /// 행 조회
    pub fn record(&self, row_index: usize) -> Option<VectorRecord> {
        let chunk = self.metadata.get(row_index)?;
        let start = row_index * self.dimension;
        Some(VectorRecord {
            row_index,
            chunk_ref: chunk.chunk_ref(),
            vector: self.data[start..start + self.dimension].to_vec(),
        })
    }

    pub fn metadata(&self) -> &[ChunkRecord] {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// 인덱스 + 메타데이터 저장
    ///
    /// 메타데이터를 먼저 교체하고 인덱스를 마지막에 rename 합니다.
    /// 헤더에 메타데이터 해시가 있으므로 중간에 중단된 쌍은 로드 시 손상으로 판정됩니다.
    pub fn save(&self, dir: &Path, generation: Uuid) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let digest = metadata_digest(&self.metadata)?;
        write_jsonl_atomic(&dir.join(META_FILE), &self.metadata)?;

        let index_path = dir.join(INDEX_FILE);
        let tmp_path = dir.join(format!("{}.tmp", INDEX_FILE));
        {
            let file = std::fs::File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(self.dimension as u32).to_le_bytes())?;
            writer.write_all(&(self.len() as u64).to_le_bytes())?;
            writer.write_all(generation.as_bytes())?;
            writer.write_all(&digest)?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, &index_path)?;

        tracing::info!(
            "Saved dense index ({} rows, dim={}, generation={})",
            self.len(),
            self.dimension,
            generation
        );
        Ok(())
    }

    /// 인덱스 + 메타데이터 로드
    ///
    /// 두 파일 모두 없으면 `None`. 한쪽만 있거나 내용이 어긋나면 `PersistenceCorruption`.
    pub fn load(dir: &Path) -> Result<Option<(Self, Uuid)>> {
        let index_path = dir.join(INDEX_FILE);
        let meta_path = dir.join(META_FILE);

        match (index_path.exists(), meta_path.exists()) {
            (false, false) => return Ok(None),
            (true, false) | (false, true) => {
                return Err(RiaError::PersistenceCorruption(format!(
                    "index/metadata pair incomplete in {:?}",
                    dir
                )))
            }
            (true, true) => {}
        }

        let corrupt = |msg: &str| RiaError::PersistenceCorruption(format!("{:?}: {}", index_path, msg));

        let mut bytes = Vec::new();
        std::fs::File::open(&index_path)?.read_to_end(&mut bytes)?;
        if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
            return Err(corrupt("bad header"));
        }

        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let format = u32_at(8);
        if format != FORMAT_VERSION {
            return Err(corrupt("unsupported format version"));
        }
        let dimension = u32_at(12) as usize;
        let mut rows_bytes = [0u8; 8];
        rows_bytes.copy_from_slice(&bytes[16..24]);
        let rows = u64::from_le_bytes(rows_bytes) as usize;
        let mut generation_bytes = [0u8; 16];
        generation_bytes.copy_from_slice(&bytes[24..40]);
        let generation = Uuid::from_bytes(generation_bytes);
        let expected_digest = &bytes[40..HEADER_LEN];

        let body = &bytes[HEADER_LEN..];
        if body.len() != rows * dimension * 4 {
            return Err(corrupt("vector payload length mismatch"));
        }
        let data: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        // 메타데이터는 손상 행을 건너뛰지 않음 - 정렬이 깨지면 안 됨
        let meta_text = std::fs::read_to_string(&meta_path)?;
        let mut metadata = Vec::with_capacity(rows);
        for line in meta_text.lines().filter(|l| !l.trim().is_empty()) {
            let record: ChunkRecord = serde_json::from_str(line)
                .map_err(|e| corrupt(&format!("bad metadata row: {}", e)))?;
            metadata.push(record);
        }

        if metadata.len() != rows {
            return Err(corrupt(&format!(
                "metadata rows {} != index rows {}",
                metadata.len(),
                rows
            )));
        }
        if metadata_digest(&metadata)?.as_slice() != expected_digest {
            return Err(corrupt("metadata checksum mismatch"));
        }

        tracing::debug!("Loaded dense index ({} rows, dim={})", rows, dimension);

        Ok(Some((
            Self {
                dimension,
                data,
                metadata,
            },
            generation,
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================
