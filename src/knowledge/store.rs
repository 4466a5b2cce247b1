//! Chunk Store - 청크 레코드 JSONL 저장소
//!
//! 전체 재인덱싱마다 통째로 다시 쓰여집니다.
//! 임시 파일에 쓴 뒤 rename 하므로 읽는 쪽은 항상 완전한 파일만 봅니다.
//!
//! 저장 위치: <index_dir>/chunks.jsonl

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.local/share/.ria-assist/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ria-assist")
}

// ============================================================================
// Types
// ============================================================================

/// 청크 레코드
///
/// `chunk_id`는 `(doc_id, version_hash)` 안에서 유일합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub version_hash: String,
    pub page: u32,
    pub chunk_id: String,
    pub text: String,
    /// 인용 표시용 소스 이름 (파일명 또는 URL)
    pub source: String,
    /// 조항 라벨 (예: "Section 5")
    pub clause: Option<String>,
}

/// 청크 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkRef {
    pub doc_id: String,
    pub version_hash: String,
    pub chunk_id: String,
}

impl ChunkRecord {
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef {
            doc_id: self.doc_id.clone(),
            version_hash: self.version_hash.clone(),
            chunk_id: self.chunk_id.clone(),
        }
    }
}

// ============================================================================
// JSONL helpers
// ============================================================================

/// 레코드 목록을 JSONL로 원자적 교체 저장
pub(crate) fn write_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

// ============================================================================
// ChunkStore
// ============================================================================

/// 청크 저장소
#[derive(Debug, Clone)]
pub struct ChunkStore {
    path: PathBuf,
}

impl ChunkStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 세대의 청크 전체 교체
    pub fn replace_all(&self, chunks: &[ChunkRecord]) -> Result<()> {
        write_jsonl_atomic(&self.path, chunks)?;
        tracing::debug!("Wrote {} chunks to {:?}", chunks.len(), self.path);
        Ok(())
    }

    /// 청크 전체 로드 (파일 없으면 빈 목록)
    ///
    /// 해석할 수 없는 행은 건너뜁니다.
    pub fn load(&self) -> Result<Vec<ChunkRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let mut chunks = Vec::new();

        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChunkRecord>(&line) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => tracing::warn!("Skipping bad chunk row: {}", e),
            }
        }

        Ok(chunks)
    }
}

// ============================================================================
// Tests
// ============================================================================
