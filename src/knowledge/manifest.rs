//! Version Manifest - append-only 문서 버전 로그
//!
//! 문서 내용의 SHA-256 해시로 버전을 식별하고,
//! 새 해시가 등장할 때만 매니페스트에 한 줄을 추가합니다.
//! 기록된 레코드는 절대 수정/삭제하지 않습니다.
//!
//! 저장 위치: <index_dir>/meta.jsonl

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Url,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Url => "url",
        }
    }
}

/// 논리 문서 (버전과 무관하게 안정적인 ID)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub id: String,
    pub kind: SourceKind,
    /// 파일 경로 또는 URL
    pub locator: String,
}

impl DocumentSource {
    pub fn file(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::File,
            locator: path.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            kind: SourceKind::Url,
            locator: url,
        }
    }
}

/// 매니페스트 레코드 (한 번 기록되면 불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub doc_id: String,
    pub version_hash: String,
    pub created_at: DateTime<Utc>,
    pub source_kind: SourceKind,
    pub locator: String,
}

/// `register` 결과
#[derive(Debug, Clone)]
pub struct Registration {
    pub version: DocumentVersion,
    /// 처음 보는 해시였는지 (매니페스트에 행이 추가되었는지)
    pub is_new: bool,
}

/// 문서 단위 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    /// 최초 등록
    Registered,
    /// 해시가 바뀌어 새 버전 추가
    NewVersion,
    /// 이미 본 해시 - 변경 없음
    Noop,
}

impl Registration {
    /// 등록 직전 버전 수를 기준으로 상태 계산
    pub fn state(&self, prior_versions: usize) -> VersionState {
        match (self.is_new, prior_versions) {
            (false, _) => VersionState::Noop,
            (true, 0) => VersionState::Registered,
            (true, _) => VersionState::NewVersion,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 정규화된 텍스트의 SHA-256 (hex)
pub fn version_hash(normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 페이지 텍스트를 하나의 정규화된 전체 텍스트로 결합
pub fn normalize_pages(pages: &[(u32, String)]) -> String {
    pages
        .iter()
        .map(|(_, text)| text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 레거시 형태를 포함한 매니페스트 한 줄 정규화
///
/// 식별 키나 해시가 없는 행, 타임스탬프를 해석할 수 없는 행은 `None`.
fn normalize_row(raw: &Value) -> Option<DocumentVersion> {
    let obj = raw.as_object()?;
    let field = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .map(str::to_string)
    };

    let doc_id = field(&["doc_id", "source", "id", "path", "url"])?;
    let version_hash = field(&["version_hash", "hash", "sha256"])?;

    let created_at = match field(&["created_at", "timestamp"]) {
        Some(ts) => DateTime::parse_from_rfc3339(&ts)
            .ok()?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let source_kind = match field(&["source_kind"]).as_deref() {
        Some("url") => SourceKind::Url,
        Some(_) => SourceKind::File,
        None if obj.contains_key("url") => SourceKind::Url,
        None => SourceKind::File,
    };

    let locator = field(&["locator", "path", "url"]).unwrap_or_default();

    Some(DocumentVersion {
        doc_id,
        version_hash,
        created_at,
        source_kind,
        locator,
    })
}

// ============================================================================
// VersionManager
// ============================================================================

/// 버전 매니저
///
/// 단일 writer 가정. 동시 수집 프로세스 간 잠금은 제공하지 않습니다.
#[derive(Debug)]
pub struct VersionManager {
    path: PathBuf,
    /// doc_id -> 추가 순서대로의 버전 목록
    versions: BTreeMap<String, Vec<DocumentVersion>>,
    record_count: usize,
}

impl VersionManager {
    /// 매니페스트 열기 (없으면 빈 상태)
    ///
    /// 손상되었거나 레거시 형태로 해석 불가한 행은 건너뜁니다.
    pub fn open(path: &Path) -> Result<Self> {
        let mut manager = Self {
            path: path.to_path_buf(),
            versions: BTreeMap::new(),
            record_count: 0,
        };

        if !path.exists() {
            return Ok(manager);
        }

        let file = std::fs::File::open(path)?;
        let mut skipped = 0usize;

        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parsed = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| normalize_row(&v));

            match parsed {
                Some(record) => manager.insert(record),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} malformed manifest rows in {:?}", skipped, path);
        }
        tracing::debug!(
            "Loaded manifest {:?} ({} records, {} documents)",
            path,
            manager.record_count,
            manager.versions.len()
        );

        Ok(manager)
    }

    fn insert(&mut self, record: DocumentVersion) {
        let entry = self.versions.entry(record.doc_id.clone()).or_default();
        // 레거시 로그에 같은 (doc_id, hash)가 중복될 수 있음 - 첫 행 유지
        if entry.iter().any(|v| v.version_hash == record.version_hash) {
            return;
        }
        entry.push(record);
        self.record_count += 1;
    }

    /// 문서 버전 등록
    ///
    /// 같은 내용으로 반복 호출해도 결과가 같습니다 (멱등).
    pub fn register(
        &mut self,
        doc_id: &str,
        normalized_text: &str,
        source_kind: SourceKind,
        locator: &str,
    ) -> Result<Registration> {
        self.register_at(doc_id, normalized_text, source_kind, locator, Utc::now())
    }

    /// 타임스탬프를 지정하여 등록
    pub fn register_at(
        &mut self,
        doc_id: &str,
        normalized_text: &str,
        source_kind: SourceKind,
        locator: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Registration> {
        let hash = version_hash(normalized_text);

        if let Some(existing) = self
            .versions
            .get(doc_id)
            .and_then(|vs| vs.iter().find(|v| v.version_hash == hash))
        {
            return Ok(Registration {
                version: existing.clone(),
                is_new: false,
            });
        }

        let record = DocumentVersion {
            doc_id: doc_id.to_string(),
            version_hash: hash,
            created_at,
            source_kind,
            locator: locator.to_string(),
        };

        self.append(&record)?;
        self.insert(record.clone());

        tracing::info!(
            "Registered new version for {} ({})",
            doc_id,
            &record.version_hash[..12]
        );

        Ok(Registration {
            version: record,
            is_new: true,
        })
    }

    /// 매니페스트 파일에 한 줄 추가
    ///
    /// flush + fsync 후 반환합니다. 다중 writer 경합은 다루지 않습니다.
    fn append(&self, record: &DocumentVersion) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_data()?;

        Ok(())
    }

    /// 가장 최근(`created_at` 최대) 버전
    ///
    /// 타임스탬프가 같으면 나중에 기록된 행이 우선합니다.
    pub fn latest(&self, doc_id: &str) -> Option<&DocumentVersion> {
        self.versions
            .get(doc_id)?
            .iter()
            .max_by_key(|v| v.created_at)
    }

    /// 문서의 전체 버전 이력 (기록 순서)
    pub fn history(&self, doc_id: &str) -> &[DocumentVersion] {
        self.versions
            .get(doc_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// 문서의 알려진 버전 수
    pub fn version_count(&self, doc_id: &str) -> usize {
        self.history(doc_id).len()
    }

    /// 알려진 문서 ID 목록
    pub fn doc_ids(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// 유효 레코드 수
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn create_test_manager() -> (TempDir, VersionManager) {
        let dir = TempDir::new().unwrap();
        let manager = VersionManager::open(&dir.path().join("meta.jsonl")).unwrap();
        (dir, manager)
    }

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(version_hash("abc"), version_hash("abc"));
        assert_ne!(version_hash("abc"), version_hash("abd"));
        assert_eq!(version_hash("abc").len(), 64);
    }

    #[test]
    fn test_register_is_idempotent() {
        let (_dir, mut manager) = create_test_manager();

        let first = manager
            .register("a.pdf", "text v1", SourceKind::File, "raw/a.pdf")
            .unwrap();
        assert!(first.is_new);
        assert_eq!(first.state(0), VersionState::Registered);

        let again = manager
            .register("a.pdf", "text v1", SourceKind::File, "raw/a.pdf")
            .unwrap();
        assert!(!again.is_new);
        assert_eq!(again.version, first.version);
        assert_eq!(again.state(1), VersionState::Noop);

        assert_eq!(manager.record_count(), 1);
        assert_eq!(line_count(manager.path()), 1);
    }

    #[test]
    fn test_new_version_appends() {
        let (_dir, mut manager) = create_test_manager();

        manager
            .register("a.pdf", "text v1", SourceKind::File, "raw/a.pdf")
            .unwrap();
        let second = manager
            .register("a.pdf", "text v2", SourceKind::File, "raw/a.pdf")
            .unwrap();

        assert!(second.is_new);
        assert_eq!(second.state(1), VersionState::NewVersion);
        assert_eq!(manager.version_count("a.pdf"), 2);
        assert_eq!(line_count(manager.path()), 2);
    }

    #[test]
    fn test_latest_uses_max_created_at() {
        let (_dir, mut manager) = create_test_manager();
        let now = Utc::now();

        manager
            .register_at("doc", "newer", SourceKind::File, "raw/doc", now)
            .unwrap();
        // 이력상 더 오래된 타임스탬프로 나중에 기록
        manager
            .register_at("doc", "older", SourceKind::File, "raw/doc", now - Duration::hours(1))
            .unwrap();

        let latest = manager.latest("doc").unwrap();
        assert_eq!(latest.version_hash, version_hash("newer"));
        assert!(manager.latest("missing").is_none());
    }

    #[test]
    fn test_reload_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.jsonl");

        {
            let mut manager = VersionManager::open(&path).unwrap();
            manager
                .register("u", "page", SourceKind::Url, "https://example.com/u")
                .unwrap();
        }

        let manager = VersionManager::open(&path).unwrap();
        let latest = manager.latest("u").unwrap();
        assert_eq!(latest.source_kind, SourceKind::Url);
        assert_eq!(latest.locator, "https://example.com/u");
    }

    #[test]
    fn test_legacy_and_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.jsonl");
        let rows = [
            // 레거시: source + hash + timestamp
            r#"{"source":"old.pdf","hash":"h1","timestamp":"2024-01-01T00:00:00+00:00","path":"raw/old.pdf"}"#,
            // 레거시: url + sha256, created_at 없음
            r#"{"url":"https://example.com/x","sha256":"h2"}"#,
            // 해시 없음 - 버림
            r#"{"doc_id":"nohash.pdf"}"#,
            // 식별 키 없음 - 버림
            r#"{"version_hash":"h3"}"#,
            // JSON 아님
            "not json at all",
            // 타임스탬프 해석 불가
            r#"{"doc_id":"bad-ts","version_hash":"h4","created_at":"yesterday"}"#,
            "",
        ];
        std::fs::write(&path, rows.join("\n")).unwrap();

        let manager = VersionManager::open(&path).unwrap();
        assert_eq!(manager.record_count(), 2);

        let old = manager.latest("old.pdf").unwrap();
        assert_eq!(old.version_hash, "h1");
        assert_eq!(old.source_kind, SourceKind::File);
        assert_eq!(old.locator, "raw/old.pdf");

        let web = manager.latest("https://example.com/x").unwrap();
        assert_eq!(web.source_kind, SourceKind::Url);
        assert_eq!(web.locator, "https://example.com/x");
    }

    #[test]
    fn test_normalize_pages() {
        let pages = vec![(1, "  first \n".to_string()), (2, "second".to_string())];
        assert_eq!(normalize_pages(&pages), "first\n\nsecond");
    }

    proptest! {
        #[test]
        fn prop_record_count_never_decreases(
            ops in proptest::collection::vec((0usize..3, 0usize..4), 1..30)
        ) {
            let (_dir, mut manager) = create_test_manager();
            let mut previous = 0usize;

            for (doc, content) in ops {
                let doc_id = format!("doc-{}", doc);
                let text = format!("content-{}", content);
                manager.register(&doc_id, &text, SourceKind::File, "raw").unwrap();

                let count = manager.record_count();
                prop_assert!(count >= previous);
                prop_assert_eq!(count, line_count(manager.path()));
                previous = count;
            }
        }
    }
}
